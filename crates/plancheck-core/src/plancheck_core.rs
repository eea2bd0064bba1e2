//! PlanCheck Core - shared vocabulary for plan analysis
//!
//! This crate provides the types that the normalizer, detectors and
//! aggregator exchange. It defines:
//!
//! - `Finding` / `Evidence` - a detected concern and the plan facts behind it
//! - `Impact` / `Confidence` - how much a finding matters and how it was derived
//! - `AnalyzeError` / `DetectorError` - the error taxonomy
//! - `EventSink` - the observer the pipeline reports progress to
//! - `AnalyzerConfig` - tunables loaded from TOML

pub mod config;
mod error;
pub mod events;
mod finding;

pub use config::AnalyzerConfig;
pub use error::*;
pub use events::{EventLevel, EventSink, LogEntry, MemorySink, NoopSink, TracingSink};
pub use finding::*;
