//! PlanCheck Analyzer - PostgreSQL EXPLAIN plan analysis
//!
//! This crate provides functionality for:
//! - Normalizing EXPLAIN output (JSON, TEXT, pgAdmin and psql exports) into a canonical plan tree
//! - Running a fixed registry of performance detectors over that tree
//! - Aggregating and ranking the resulting findings

pub mod aggregate;
pub mod analyzer;
pub mod detectors;
pub mod engine;
pub mod explain;

pub use aggregate::aggregate;
pub use analyzer::{AnalysisReport, AnalysisSummary, PlanAnalyzer};
pub use detectors::{Detector, DetectorResult, default_registry};
pub use engine::DetectionEngine;
pub use explain::*;

/// Extracts the message from a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
