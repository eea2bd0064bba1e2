//! Parallel query detector

use super::DetectorResult;
use crate::explain::PlanNode;
use plancheck_core::{Confidence, Evidence, Finding, Impact};

pub const PARALLEL_QUERY_WORKER_SHORTAGE: &str = "parallel_query_worker_shortage";

/// Gather or Gather Merge that launched fewer workers than planned
pub fn parallel_query_worker_shortage(node: &PlanNode) -> DetectorResult {
    if !node.node_type.contains("Gather") {
        return Ok(None);
    }
    let (Some(planned), Some(launched)) = (node.workers_planned, node.workers_launched) else {
        return Ok(None);
    };
    if launched >= planned {
        return Ok(None);
    }

    let missing = planned - launched;
    let impact = if launched == 0 {
        Impact::High
    } else {
        Impact::Medium
    };
    let location = node.location();

    let finding = Finding::new(
        PARALLEL_QUERY_WORKER_SHORTAGE,
        "Parallel Query Worker Shortage",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Workers Planned",
        planned,
        format!("Workers Planned: {}", planned),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Workers Launched",
        launched,
        format!("Workers Launched: {} ({} missing)", launched, missing),
        &location,
    ))
    .with_behavior(format!(
        "PostgreSQL planned to use {} parallel workers but only launched {}.",
        planned, launched
    ))
    .with_explanation([
        "The query optimizer expected parallel execution but couldn't get all requested workers.".to_string(),
        "This typically happens when max_parallel_workers or max_parallel_workers_per_gather is too low.".to_string(),
        "Other concurrent queries may have already consumed the available worker pool.".to_string(),
        if launched == 0 {
            "No workers were launched at all; the query ran entirely in serial mode.".to_string()
        } else {
            format!("Only {} of {} workers were available.", launched, planned)
        },
    ])
    .with_limitations([
        "Cannot see current max_parallel_workers setting",
        "Cannot determine how many workers were in use by other queries",
        "Cannot measure the actual performance impact of reduced parallelism",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/parallel-query.html");

    Ok(Some(finding))
}
