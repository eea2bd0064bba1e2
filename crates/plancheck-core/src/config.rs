//! Analyzer configuration
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! primary_parse_timeout_ms = 5000
//! parallel_detection = true
//! disabled_detectors = ["cte_materialization"]
//! ```
//!
//! Detector thresholds are fixed constants and are not configurable.

use crate::error::{AnalyzeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the plan analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Deadline for the primary structured parser, in milliseconds
    pub primary_parse_timeout_ms: u64,
    /// Evaluate detectors across nodes on the rayon pool
    pub parallel_detection: bool,
    /// Detector ids to leave out of the registry
    pub disabled_detectors: Vec<String>,
    /// Number of events kept by an in-memory event sink
    pub log_buffer_capacity: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            primary_parse_timeout_ms: 10_000,
            parallel_detection: false,
            disabled_detectors: Vec::new(),
            log_buffer_capacity: 1000,
        }
    }
}

impl AnalyzerConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a config from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        if self.primary_parse_timeout_ms == 0 {
            return Err(AnalyzeError::Configuration(
                "primary_parse_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.log_buffer_capacity == 0 {
            return Err(AnalyzeError::Configuration(
                "log_buffer_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Returns the primary parse deadline
    pub fn primary_parse_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_parse_timeout_ms)
    }

    /// Returns true if the detector with this id should run
    pub fn is_detector_enabled(&self, id: &str) -> bool {
        !self.disabled_detectors.iter().any(|d| d == id)
    }

    /// Sets the primary parse deadline
    pub fn with_primary_parse_timeout(mut self, timeout: Duration) -> Self {
        self.primary_parse_timeout_ms = (timeout.as_millis() as u64).max(1);
        self
    }

    /// Sets whether detectors run in parallel across nodes
    pub fn with_parallel_detection(mut self, parallel: bool) -> Self {
        self.parallel_detection = parallel;
        self
    }

    /// Disables a detector by id
    pub fn with_disabled_detector(mut self, id: impl Into<String>) -> Self {
        self.disabled_detectors.push(id.into());
        self
    }

    /// Sets the in-memory event history size
    pub fn with_log_buffer_capacity(mut self, capacity: usize) -> Self {
        self.log_buffer_capacity = capacity.max(1);
        self
    }
}
