//! Error types for PlanCheck

use thiserror::Error;

/// Errors surfaced to callers of the analysis pipeline.
///
/// Parse failures are deliberately absent: every format problem is absorbed
/// by the normalizer's fallback chain and ends, at worst, in a `Parse Error`
/// node. Only input that is empty before any parsing starts is rejected.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Please paste an EXPLAIN plan to analyze.")]
    EmptyInput,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AnalyzeError {
    /// Returns true if the caller handed over nothing to analyze
    pub fn is_empty_input(&self) -> bool {
        matches!(self, Self::EmptyInput)
    }
}

/// Result type alias for analysis operations
pub type Result<T> = std::result::Result<T, AnalyzeError>;

/// A fault raised by a single detector on a single node.
///
/// The detection engine logs these and moves on; they never abort a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("{detector}: required field '{field}' is missing")]
    MissingField {
        detector: &'static str,
        field: &'static str,
    },

    #[error("{detector}: {message}")]
    Invalid {
        detector: &'static str,
        message: String,
    },
}
