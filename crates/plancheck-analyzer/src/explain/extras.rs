//! Trigger and JIT sections of TEXT output
//!
//! These appear after the plan tree in EXPLAIN ANALYZE TEXT output:
//!
//! ```text
//! Trigger audit_orders on orders: time=1520.120 calls=1000
//! JIT:
//!   Functions: 12
//!   Options: Inlining true, Optimization true, Expressions true, Deforming true
//!   Timing: Generation 4.2 ms, Inlining 125.4 ms, Optimization 450.1 ms, Emission 89.2 ms, Total 669.0 ms
//! ```

use crate::explain::cleanup::{TextLine, text_lines};
use crate::explain::plan::{JitInfo, JitTiming, TriggerTiming};
use regex::Regex;
use std::sync::LazyLock;

static POSTGRES_TRIGGER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^Trigger\s+(?:for constraint\s+(?P<constraint>\S+?)|(?P<name>\S+?)(?:\s+for constraint\s+\S+?)?)(?:\s+on\s+(?P<rel>\S+?))?:\s*time=(?P<time>[\d.]+)\s+calls=(?P<calls>\d+)",
    )
    .expect("valid regex")
});

static BARE_TRIGGER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\w+):\s*time=([\d.]+)\s+calls=(\d+)").expect("valid regex")
});

static JIT_FUNCTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Functions:\s*(\d+)").expect("valid regex"));

static JIT_OPTIONS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Options:\s*(.+)$").expect("valid regex"));

static JIT_TIMING_PHASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(Generation|Inlining|Optimization|Emission|Total)\s+([\d.]+)\s*ms")
        .expect("valid regex")
});

/// Parses a single trigger timing line.
///
/// Accepts PostgreSQL's `Trigger name [on rel]: time=X calls=N` and the
/// shorter `name: time=X calls=N`.
pub fn parse_trigger_line(content: &str) -> Option<TriggerTiming> {
    if let Some(caps) = POSTGRES_TRIGGER_LINE.captures(content) {
        let name = caps.name("name").or_else(|| caps.name("constraint"))?;
        return Some(TriggerTiming {
            name: name.as_str().to_string(),
            total_time_ms: caps["time"].parse().ok()?,
            calls: caps["calls"].parse().ok()?,
            relation: caps.name("rel").map(|m| m.as_str().to_string()),
        });
    }

    let caps = BARE_TRIGGER_LINE.captures(content)?;
    Some(TriggerTiming {
        name: caps[1].to_string(),
        total_time_ms: caps[2].parse().ok()?,
        calls: caps[3].parse().ok()?,
        relation: None,
    })
}

/// Collects every trigger timing line in the raw text
pub fn extract_triggers(raw: &str) -> Vec<TriggerTiming> {
    text_lines(raw)
        .iter()
        .filter_map(|line| parse_trigger_line(&line.content))
        .collect()
}

/// Parses the phases of a JIT `Timing:` line
pub fn parse_jit_timing(content: &str) -> Option<JitTiming> {
    let rest = content
        .strip_prefix("Timing:")
        .or_else(|| content.strip_prefix("timing:"))?;

    let mut timing = JitTiming::default();
    let mut found = false;
    for caps in JIT_TIMING_PHASE.captures_iter(rest) {
        let Ok(ms) = caps[2].parse::<f64>() else {
            continue;
        };
        found = true;
        match caps[1].to_ascii_lowercase().as_str() {
            "generation" => timing.generation = Some(ms),
            "inlining" => timing.inlining = Some(ms),
            "optimization" => timing.optimization = Some(ms),
            "emission" => timing.emission = Some(ms),
            _ => timing.total = Some(ms),
        }
    }
    found.then_some(timing)
}

/// Parses the JIT block from already cleaned lines.
///
/// The block starts at a `JIT:` line and ends at the first line that is not
/// indented deeper than it.
pub fn jit_from_lines(lines: &[TextLine]) -> Option<JitInfo> {
    let start = lines.iter().position(|line| line.content == "JIT:")?;
    let header_indent = lines[start].indent;

    let mut jit = JitInfo::default();
    for line in lines[start + 1..]
        .iter()
        .take_while(|line| line.indent > header_indent)
    {
        let content = line.content.as_str();
        if let Some(caps) = JIT_FUNCTIONS.captures(content) {
            jit.functions = caps[1].parse().ok();
        } else if let Some(caps) = JIT_OPTIONS.captures(content) {
            jit.options_text = Some(caps[1].trim().to_string());
        } else if let Some(timing) = parse_jit_timing(content) {
            jit.timing = Some(timing);
        }
    }

    (jit.functions.is_some() || jit.timing.is_some()).then_some(jit)
}

/// Extracts the JIT block from the raw text
pub fn extract_jit(raw: &str) -> Option<JitInfo> {
    jit_from_lines(&text_lines(raw))
}
