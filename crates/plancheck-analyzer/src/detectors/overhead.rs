//! Execution overhead detectors: JIT compilation and triggers

use super::DetectorResult;
use crate::explain::PlanNode;
use plancheck_core::{Confidence, Evidence, Finding, Impact};

pub const JIT_COMPILATION_OVERHEAD: &str = "jit_compilation_overhead";
pub const TRIGGER_OVERHEAD: &str = "trigger_overhead";

const MIN_JIT_PERCENT: f64 = 20.0;
const MIN_TRIGGER_MS: f64 = 1000.0;

fn jit_impact(percent: f64, total_ms: f64) -> Impact {
    if percent >= 50.0 || total_ms >= 1000.0 {
        Impact::High
    } else if percent >= 30.0 || total_ms >= 500.0 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

/// JIT compilation taking at least 20% of the node's execution time
pub fn jit_compilation_overhead(node: &PlanNode) -> DetectorResult {
    let Some(jit) = &node.jit else {
        return Ok(None);
    };
    let Some(timing) = jit.timing else {
        return Ok(None);
    };
    let Some(total_ms) = timing.total else {
        return Ok(None);
    };
    let Some(node_ms) = node.actual_total_time_ms.filter(|ms| *ms > 0.0) else {
        return Ok(None);
    };

    let jit_percent = total_ms / node_ms * 100.0;
    if jit_percent < MIN_JIT_PERCENT {
        return Ok(None);
    }

    let location = node.location();
    let breakdown = timing.optimization.map(|optimization| {
        format!(
            "Optimization {:.1} ms, Inlining {:.1} ms, Emission {:.1} ms, Generation {:.1} ms",
            optimization,
            timing.inlining.unwrap_or(0.0),
            timing.emission.unwrap_or(0.0),
            timing.generation.unwrap_or(0.0)
        )
    });

    let finding = Finding::new(
        JIT_COMPILATION_OVERHEAD,
        "JIT Compilation Overhead",
        Confidence::Verified,
        jit_impact(jit_percent, total_ms),
    )
    .with_evidence(Evidence::new(
        "JIT Total Time",
        total_ms,
        format!("JIT compilation: {:.2} ms", total_ms),
        &location,
    ))
    .with_evidence(Evidence::new(
        "JIT Percentage",
        jit_percent,
        format!("{:.1}% of execution time", jit_percent),
        "Computed",
    ))
    .with_optional_evidence(jit.functions.filter(|f| *f > 0).map(|functions| {
        Evidence::new(
            "Functions Compiled",
            functions,
            format!("{} functions compiled", functions),
            &location,
        )
    }))
    .with_optional_evidence(breakdown.map(|text| {
        Evidence::new("JIT Breakdown", text.as_str(), text.clone(), &location)
    }))
    .with_behavior(format!(
        "JIT compilation consumed {:.0} ms ({:.0}% of execution time).",
        total_ms, jit_percent
    ))
    .with_explanation([
        "JIT compilation converts query expressions to native machine code.".to_string(),
        "For long-running analytical queries, JIT can provide significant speedups.".to_string(),
        "For short queries, JIT compilation overhead often exceeds its performance benefit.".to_string(),
        format!(
            "This query spent {:.0}% of its time on JIT compilation.",
            jit_percent
        ),
    ])
    .with_limitations([
        "Cannot determine if JIT actually improved execution speed for this query",
        "Cannot measure what execution time would be without JIT",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/jit.html");

    Ok(Some(finding))
}

/// Triggers taking at least one second in total
pub fn trigger_overhead(node: &PlanNode) -> DetectorResult {
    if node.triggers.is_empty() {
        return Ok(None);
    }
    let trigger_ms = node.total_trigger_time_ms();
    if trigger_ms < MIN_TRIGGER_MS {
        return Ok(None);
    }

    let calls = node.triggers.iter().map(|t| t.calls).max().unwrap_or(0);
    let node_ms = node.actual_total_time_ms.filter(|ms| *ms > 0.0);
    let share = node_ms.map(|ms| trigger_ms / ms * 100.0);
    let dominant = share.is_some_and(|pct| pct >= 50.0);
    let impact = if dominant { Impact::High } else { Impact::Medium };
    let location = node.location();

    let per_trigger = node
        .triggers
        .iter()
        .filter(|t| t.total_time_ms > 0.0)
        .map(|t| {
            let target = match &t.relation {
                Some(rel) => format!("{} on {}", t.name, rel),
                None => t.name.clone(),
            };
            Evidence::new(
                format!("Trigger {}", t.name),
                t.total_time_ms,
                format!(
                    "{}: {:.2}s ({} calls)",
                    target,
                    t.total_time_ms / 1000.0,
                    t.calls
                ),
                t.relation.clone().unwrap_or_else(|| location.clone()),
            )
        })
        .collect::<Vec<_>>();

    let mut finding = Finding::new(
        TRIGGER_OVERHEAD,
        "Trigger Execution Overhead",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Total Trigger Time",
        trigger_ms,
        format!("Total trigger time: {:.2}s", trigger_ms / 1000.0),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Trigger Calls",
        calls,
        format!("Trigger invocations: {}", calls),
        &location,
    ))
    .with_optional_evidence(share.map(|pct| {
        Evidence::new(
            "Time Percentage",
            pct.round(),
            format!("Trigger time: {:.0}% of total execution", pct),
            "Computed",
        )
    }));
    for evidence in per_trigger {
        finding = finding.with_evidence(evidence);
    }

    let finding = finding
        .with_behavior(format!(
            "Triggers consumed {:.2}s across {} invocations.",
            trigger_ms / 1000.0,
            calls
        ))
        .with_explanation([
            format!(
                "{} trigger(s) executed up to {} times each.",
                node.triggers.len(),
                calls
            ),
            format!(
                "Total trigger overhead: {:.2} seconds.",
                trigger_ms / 1000.0
            ),
            match share {
                Some(pct) if dominant => {
                    format!("Triggers account for {:.0}% of execution time.", pct)
                }
                _ => String::new(),
            },
            "Each row modification invokes all applicable triggers.".to_string(),
        ])
        .with_limitations([
            "Cannot determine trigger complexity or optimization potential",
            "Cannot assess if triggers are necessary for business logic",
            "Bulk operations amplify trigger overhead proportionally",
        ])
        .with_docs_link("https://www.postgresql.org/docs/current/trigger-definition.html");

    Ok(Some(finding))
}
