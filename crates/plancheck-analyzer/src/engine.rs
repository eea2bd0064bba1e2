//! Detection Engine
//!
//! Walks every plan of an `AnalysisInput` in pre-order and runs each
//! registered detector on each valid node. Invalid nodes are skipped
//! together with their subtree. A detector that fails or panics is reported
//! to the event sink and otherwise ignored, so one broken rule never hides
//! the findings of the others.

use crate::aggregate::aggregate;
use crate::detectors::{Detector, default_registry};
use crate::explain::{AnalysisInput, PlanNode};
use crate::panic_message;
use plancheck_core::{AnalyzerConfig, EventLevel, EventSink, Finding, TracingSink};
use rayon::prelude::*;
use serde_json::{Value, json};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

const MODULE: &str = "Engine";

/// A node queued for evaluation, with its diagnostic path
struct Visit<'a> {
    path: String,
    node: &'a PlanNode,
}

/// Runs the detector registry over plan trees
#[derive(Clone)]
pub struct DetectionEngine {
    registry: Vec<Detector>,
    parallel: bool,
    sink: Arc<dyn EventSink>,
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionEngine {
    /// Creates an engine with every built-in detector
    pub fn new() -> Self {
        Self::from_config(&AnalyzerConfig::default())
    }

    /// Creates an engine with the built-in detectors the config leaves enabled
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        let registry = default_registry()
            .into_iter()
            .filter(|d| config.is_detector_enabled(d.id))
            .collect();

        Self {
            registry,
            parallel: config.parallel_detection,
            sink: Arc::new(TracingSink),
        }
    }

    /// Replaces the detector registry
    pub fn with_registry(mut self, registry: Vec<Detector>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &[Detector] {
        &self.registry
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Runs every detector on every valid node and returns the raw findings
    /// in traversal order
    pub fn detect(&self, input: &AnalysisInput) -> Vec<Finding> {
        let mut visits = Vec::new();
        let mut skipped = 0;
        let multi_plan = input.is_multi_plan();

        for (i, plan) in input.plans().enumerate() {
            let root = if multi_plan {
                format!("plan[{}].root", i)
            } else {
                "root".to_string()
            };
            self.collect(plan, root, &mut visits, &mut skipped);
        }

        let findings: Vec<Finding> = if self.parallel {
            visits
                .par_iter()
                .map(|visit| self.evaluate(visit))
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        } else {
            visits.iter().flat_map(|visit| self.evaluate(visit)).collect()
        };

        self.emit(
            EventLevel::Info,
            "Detection complete",
            Some(json!({
                "nodes": visits.len(),
                "skipped": skipped,
                "detectors": self.registry.len(),
                "findings": findings.len(),
                "parallel": self.parallel,
            })),
        );

        findings
    }

    /// Detects and aggregates in one step
    pub fn run(&self, input: &AnalysisInput) -> Vec<Finding> {
        let raw = self.detect(input);
        let raw_count = raw.len();
        let findings = aggregate(raw);

        self.emit(
            EventLevel::Info,
            "Aggregated findings",
            Some(json!({ "raw": raw_count, "unique": findings.len() })),
        );
        findings
    }

    /// Queues the valid nodes of one plan in pre-order
    fn collect<'a>(
        &self,
        root: &'a PlanNode,
        root_path: String,
        visits: &mut Vec<Visit<'a>>,
        skipped: &mut usize,
    ) {
        let mut stack = vec![(root, root_path)];

        while let Some((node, path)) = stack.pop() {
            if !node.is_valid() {
                *skipped += 1;
                self.emit(
                    EventLevel::Debug,
                    "Skipping invalid node",
                    Some(json!({ "path": path })),
                );
                continue;
            }

            for (i, child) in node.children.iter().enumerate().rev() {
                stack.push((child, format!("{}.Plans[{}]", path, i)));
            }
            visits.push(Visit { path, node });
        }
    }

    fn evaluate(&self, visit: &Visit<'_>) -> Vec<Finding> {
        let mut findings = Vec::new();

        for detector in &self.registry {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| detector.evaluate(visit.node)));
            match outcome {
                Ok(Ok(Some(finding))) => {
                    self.emit(
                        EventLevel::Debug,
                        "Detector triggered",
                        Some(json!({
                            "detector": detector.id,
                            "path": visit.path,
                            "impact": finding.impact.as_str(),
                        })),
                    );
                    findings.push(finding);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => self.emit(
                    EventLevel::Error,
                    "Detector failed",
                    Some(json!({
                        "detector": detector.id,
                        "path": visit.path,
                        "error": e.to_string(),
                    })),
                ),
                Err(payload) => self.emit(
                    EventLevel::Error,
                    "Detector panicked",
                    Some(json!({
                        "detector": detector.id,
                        "path": visit.path,
                        "panic": panic_message(payload.as_ref()),
                    })),
                ),
            }
        }

        findings
    }

    fn emit(&self, level: EventLevel, message: &str, data: Option<Value>) {
        self.sink.on_event(level, MODULE, message, data.as_ref());
    }
}
