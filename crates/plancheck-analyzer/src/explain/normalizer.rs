//! Plan Normalizer
//!
//! Runs the parse chain over raw EXPLAIN output:
//!
//! 1. timing pre-extraction (authoritative for planning/execution time)
//! 2. the injected primary parser, if any, under a deadline
//! 3. fallback JSON parsing
//! 4. fallback TEXT parsing
//! 5. a terminal `Parse Error` node
//!
//! Only empty input is an error. Anything else produces an `AnalysisInput`.

use crate::explain::json;
use crate::explain::plan::{AnalysisInput, ParseSource, PlanNode};
use crate::explain::primary::{self, RichParser};
use crate::explain::text;
use crate::explain::timing::{self, Timings};
use plancheck_core::{AnalyzeError, AnalyzerConfig, EventLevel, EventSink, Result, TracingSink};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// Description carried by the terminal parse error node
pub const PARSE_ERROR_DESCRIPTION: &str =
    "Unable to parse the input. Please ensure it's valid EXPLAIN output.";

const MODULE: &str = "Parser";

/// Turns raw EXPLAIN output into an [`AnalysisInput`]
#[derive(Clone)]
pub struct Normalizer {
    primary: Option<Arc<dyn RichParser>>,
    deadline: Duration,
    sink: Arc<dyn EventSink>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    /// Creates a normalizer with only the fallback stages
    pub fn new() -> Self {
        Self::from_config(&AnalyzerConfig::default())
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            primary: None,
            deadline: config.primary_parse_timeout(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Installs the primary structured parser
    pub fn with_primary_parser(mut self, parser: Arc<dyn RichParser>) -> Self {
        self.primary = Some(parser);
        self
    }

    /// Sets the deadline for the primary parser
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn has_primary_parser(&self) -> bool {
        self.primary.is_some()
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Normalizes raw EXPLAIN output, trying the primary parser first
    pub async fn normalize(&self, raw: &str) -> Result<AnalysisInput> {
        let timings = self.begin(raw)?;

        if let Some(parser) = &self.primary {
            match primary::parse_primary(parser.clone(), raw, self.deadline).await {
                Ok(plan) => {
                    let mut timings = timings;
                    timings.fill_from(plan.timings);
                    self.emit(
                        EventLevel::Info,
                        "Primary parser succeeded",
                        Some(json!({ "nodes": plan.tree.node_count() })),
                    );
                    return Ok(build_input(ParseSource::Primary, plan.tree, timings));
                }
                Err(e) => self.emit(
                    EventLevel::Warn,
                    "Primary parser failed, using fallback parsers",
                    Some(json!({ "error": e.to_string() })),
                ),
            }
        }

        Ok(self.run_fallbacks(raw, timings))
    }

    /// Normalizes raw EXPLAIN output with the built-in stages only
    pub fn normalize_fallback(&self, raw: &str) -> Result<AnalysisInput> {
        let timings = self.begin(raw)?;
        Ok(self.run_fallbacks(raw, timings))
    }

    fn begin(&self, raw: &str) -> Result<Timings> {
        if raw.trim().is_empty() {
            self.emit(EventLevel::Warn, "Rejected empty input", None);
            return Err(AnalyzeError::EmptyInput);
        }

        self.emit(
            EventLevel::Info,
            "Starting plan normalization",
            Some(json!({ "length": raw.len() })),
        );

        let timings = timing::extract(raw);
        self.emit(
            EventLevel::Debug,
            "Extracted timings",
            Some(json!({
                "planning_ms": timings.planning_ms,
                "execution_ms": timings.execution_ms,
            })),
        );
        Ok(timings)
    }

    fn run_fallbacks(&self, raw: &str, mut timings: Timings) -> AnalysisInput {
        match json::parse_json_plan(raw) {
            Ok(plan) => {
                timings.fill_from(plan.timings);
                self.emit(
                    EventLevel::Info,
                    "Parsed JSON plan",
                    Some(json!({
                        "nodes": plan.tree.node_count(),
                        "additional_plans": plan.additional_plans.len(),
                    })),
                );
                let mut input = build_input(ParseSource::Fallback, plan.tree, timings);
                input.additional_plans = plan.additional_plans;
                return input;
            }
            Err(e) => self.emit(
                EventLevel::Debug,
                "JSON parser declined",
                Some(json!({ "reason": e.to_string() })),
            ),
        }

        if let Some(plan) = text::parse_text_plan(raw) {
            timings.fill_from(plan.timings);
            self.emit(
                EventLevel::Info,
                "Parsed TEXT plan",
                Some(json!({ "nodes": plan.tree.node_count() })),
            );
            return build_input(ParseSource::Fallback, plan.tree, timings);
        }

        self.emit(EventLevel::Error, "All parsers failed", None);
        AnalysisInput::new(
            ParseSource::Fallback,
            PlanNode::parse_error(PARSE_ERROR_DESCRIPTION),
        )
    }

    fn emit(&self, level: EventLevel, message: &str, data: Option<Value>) {
        self.sink.on_event(level, MODULE, message, data.as_ref());
    }
}

fn build_input(source: ParseSource, tree: PlanNode, timings: Timings) -> AnalysisInput {
    AnalysisInput::new(source, tree)
        .with_planning_time(timings.planning_ms)
        .with_execution_time(timings.execution_ms)
}
