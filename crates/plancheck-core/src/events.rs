//! Pipeline events
//!
//! The normalizer and the detection engine report what they do through an
//! injected `EventSink` rather than a global logger. `TracingSink` forwards
//! to `tracing`, `MemorySink` keeps a bounded history for display, and
//! `NoopSink` discards everything.

use crate::config::AnalyzerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Severity of a pipeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Observer for pipeline events.
///
/// Implementations must not influence the pipeline: the analysis result is
/// identical whichever sink is installed.
pub trait EventSink: Send + Sync {
    fn on_event(
        &self,
        level: EventLevel,
        module: &str,
        message: &str,
        data: Option<&serde_json::Value>,
    );
}

/// Forwards events to the `tracing` subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(
        &self,
        level: EventLevel,
        module: &str,
        message: &str,
        data: Option<&serde_json::Value>,
    ) {
        let data = data.map(|d| d.to_string()).unwrap_or_default();
        match level {
            EventLevel::Debug => tracing::debug!(module, data = %data, "{}", message),
            EventLevel::Info => tracing::info!(module, data = %data, "{}", message),
            EventLevel::Warn => tracing::warn!(module, data = %data, "{}", message),
            EventLevel::Error => tracing::error!(module, data = %data, "{}", message),
        }
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn on_event(&self, _: EventLevel, _: &str, _: &str, _: Option<&serde_json::Value>) {}
}

/// A recorded pipeline event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub module: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Keeps the most recent events in memory, oldest dropped first
#[derive(Debug)]
pub struct MemorySink {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl MemorySink {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    /// Creates a sink holding `log_buffer_capacity` entries
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self::with_capacity(config.log_buffer_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a snapshot of the recorded entries, oldest first
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Returns recorded entries at the given level
    pub fn entries_at(&self, level: EventLevel) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for MemorySink {
    fn on_event(
        &self,
        level: EventLevel,
        module: &str,
        message: &str,
        data: Option<&serde_json::Value>,
    ) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            module: module.to_string(),
            message: message.to_string(),
            data: data.cloned(),
        };

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }
}
