//! Planning and execution time extraction
//!
//! Timings are read from the raw input before any stage parses it, so the
//! values reported by PostgreSQL win over anything a parser derives later.

use crate::explain::json::extract_json_value;
use crate::explain::cleanup::text_lines;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static PLANNING_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Planning Time:\s*([\d.]+)\s*ms").expect("valid regex")
});

static EXECUTION_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:Execution Time|Total runtime):\s*([\d.]+)\s*ms").expect("valid regex")
});

/// Planning and execution time in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Timings {
    pub planning_ms: Option<f64>,
    pub execution_ms: Option<f64>,
}

impl Timings {
    pub fn new(planning_ms: Option<f64>, execution_ms: Option<f64>) -> Self {
        Self {
            planning_ms,
            execution_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.planning_ms.is_none() && self.execution_ms.is_none()
    }

    /// Fills only the fields that are still empty
    pub fn fill_from(&mut self, other: Timings) {
        self.planning_ms = self.planning_ms.or(other.planning_ms);
        self.execution_ms = self.execution_ms.or(other.execution_ms);
    }
}

fn capture_ms(pattern: &Regex, line: &str) -> Option<f64> {
    pattern.captures(line)?.get(1)?.as_str().parse().ok()
}

/// Scans TEXT lines for `Planning Time:` and `Execution Time:` entries.
///
/// The first occurrence of each wins.
pub fn scan_text(raw: &str) -> Timings {
    let mut timings = Timings::default();
    for line in text_lines(raw) {
        if timings.planning_ms.is_none() {
            timings.planning_ms = capture_ms(&PLANNING_TIME, &line.content);
        }
        if timings.execution_ms.is_none() {
            timings.execution_ms = capture_ms(&EXECUTION_TIME, &line.content);
        }
    }
    timings
}

/// Reads timings from a parsed EXPLAIN JSON document.
///
/// Root-level `Execution Time` and `Planning Time` are preferred; otherwise
/// the plan's `Actual Total Time` and `Planning Time` are used.
pub fn from_json(document: &Value) -> Timings {
    let root = match document {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return Timings::default(),
        },
        other => other,
    };
    let plan = root.get("Plan").or_else(|| root.get("plan")).unwrap_or(root);

    Timings {
        planning_ms: root
            .get("Planning Time")
            .and_then(Value::as_f64)
            .or_else(|| plan.get("Planning Time").and_then(Value::as_f64)),
        execution_ms: root
            .get("Execution Time")
            .and_then(Value::as_f64)
            .or_else(|| plan.get("Actual Total Time").and_then(Value::as_f64)),
    }
}

/// Extracts timings from the raw input, TEXT lines first, JSON second
pub fn extract(raw: &str) -> Timings {
    let timings = scan_text(raw);
    if !timings.is_empty() {
        return timings;
    }

    match extract_json_value(raw) {
        Ok(document) => from_json(&document),
        Err(_) => Timings::default(),
    }
}
