//! Plan analyzer
//!
//! `PlanAnalyzer` ties the pipeline together: normalize the raw EXPLAIN
//! output, run the detectors, aggregate the findings and wrap everything in
//! an `AnalysisReport`.

use crate::detectors::Detector;
use crate::engine::DetectionEngine;
use crate::explain::{AnalysisInput, Normalizer, PARSE_ERROR_DESCRIPTION, RichParser};
use chrono::{DateTime, Utc};
use plancheck_core::{
    AnalyzerConfig, EventLevel, EventSink, Finding, Impact, MemorySink, Result, TracingSink,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const MODULE: &str = "Analyzer";

/// Result of analyzing one EXPLAIN plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// The text exactly as it was submitted
    pub raw_input: String,
    /// The normalized plan
    pub input: AnalysisInput,
    /// Aggregated findings, highest impact first
    pub findings: Vec<Finding>,
    /// Wall time spent analyzing, in milliseconds
    pub analysis_time_ms: f64,
}

impl AnalysisReport {
    /// Returns true if any finding is high impact
    pub fn has_high_impact(&self) -> bool {
        self.findings.iter().any(|f| f.impact.is_high())
    }

    /// Returns the findings with exactly the given impact
    pub fn findings_with_impact(&self, impact: Impact) -> Vec<&Finding> {
        self.findings.iter().filter(|f| f.impact == impact).collect()
    }

    pub fn finding_count(&self) -> usize {
        self.findings.len()
    }

    /// Counts findings by impact and describes them in one line
    pub fn summary(&self) -> AnalysisSummary {
        let count = |impact| self.findings.iter().filter(|f| f.impact == impact).count();
        let high = count(Impact::High);
        let medium = count(Impact::Medium);
        let low = count(Impact::Low);

        let message = if self.input.is_parse_error() {
            PARSE_ERROR_DESCRIPTION.to_string()
        } else if self.findings.is_empty() {
            "Plan looks healthy - no issues detected.".to_string()
        } else if high > 0 {
            format!(
                "Plan has {} high-impact issue(s), {} medium-impact issue(s), and {} low-impact issue(s).",
                high, medium, low
            )
        } else if medium > 0 {
            format!(
                "Plan has {} medium-impact issue(s) and {} low-impact issue(s).",
                medium, low
            )
        } else {
            format!("Plan has {} minor issue(s).", low)
        };

        AnalysisSummary {
            high,
            medium,
            low,
            message,
        }
    }
}

/// Finding counts by impact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub message: String,
}

impl AnalysisSummary {
    pub fn total(&self) -> usize {
        self.high + self.medium + self.low
    }
}

/// Analyzes EXPLAIN plans end to end
#[derive(Clone)]
pub struct PlanAnalyzer {
    config: AnalyzerConfig,
    sink: Arc<dyn EventSink>,
    normalizer: Normalizer,
    engine: DetectionEngine,
}

impl Default for PlanAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanAnalyzer {
    /// Creates a new analyzer with default config
    pub fn new() -> Self {
        Self::with_config(AnalyzerConfig::default())
    }

    /// Creates a new analyzer with custom config
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self {
            normalizer: Normalizer::from_config(&config),
            engine: DetectionEngine::from_config(&config),
            sink: Arc::new(TracingSink),
            config,
        }
    }

    /// Routes pipeline events to the given sink
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.normalizer = self.normalizer.with_sink(sink.clone());
        self.engine = self.engine.with_sink(sink.clone());
        self.sink = sink;
        self
    }

    /// Records pipeline events in memory, keeping the last
    /// `log_buffer_capacity` of them
    pub fn with_event_history(self) -> (Self, Arc<MemorySink>) {
        let history = Arc::new(MemorySink::from_config(&self.config));
        (self.with_sink(history.clone()), history)
    }

    /// Installs the primary structured parser
    pub fn with_primary_parser(mut self, parser: Arc<dyn RichParser>) -> Self {
        self.normalizer = self.normalizer.with_primary_parser(parser);
        self
    }

    /// Replaces the built-in detectors
    pub fn with_registry(mut self, registry: Vec<Detector>) -> Self {
        self.engine = self.engine.with_registry(registry);
        self
    }

    /// Returns the analyzer config
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Analyzes raw EXPLAIN output. Fails only on empty input.
    #[tracing::instrument(skip(self, raw), fields(length = raw.len()))]
    pub async fn analyze(&self, raw: &str) -> Result<AnalysisReport> {
        let started = Instant::now();
        let input = self.normalizer.normalize(raw).await?;
        Ok(self.finish(raw, input, started))
    }

    /// Analyzes raw EXPLAIN output without the primary parser
    #[tracing::instrument(skip(self, raw), fields(length = raw.len()))]
    pub fn analyze_fallback(&self, raw: &str) -> Result<AnalysisReport> {
        let started = Instant::now();
        let input = self.normalizer.normalize_fallback(raw)?;
        Ok(self.finish(raw, input, started))
    }

    fn finish(&self, raw: &str, input: AnalysisInput, started: Instant) -> AnalysisReport {
        let findings = self.engine.run(&input);
        let report = AnalysisReport {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            raw_input: raw.to_string(),
            input,
            findings,
            analysis_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        };

        self.sink.on_event(
            EventLevel::Info,
            MODULE,
            "Analysis complete",
            Some(&json!({
                "id": report.id.to_string(),
                "findings": report.findings.len(),
                "high_impact": report.has_high_impact(),
                "elapsed_ms": report.analysis_time_ms,
            })),
        );
        report
    }
}
