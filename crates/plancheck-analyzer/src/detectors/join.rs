//! Join detectors: hash batching, nested loop iterations and join filters

use super::{DetectorResult, WORK_MEM_DOCS, check_finite, percent};
use crate::explain::{NodeType, PlanNode};
use plancheck_core::{Confidence, DetectorError, Evidence, Finding, Impact};

pub const HASH_JOIN_MEMORY_PRESSURE: &str = "hash_join_memory_pressure";
pub const HIGH_FREQ_NESTED_LOOP: &str = "high_freq_nested_loop";
pub const JOIN_FILTER_HIGH_REMOVAL: &str = "join_filter_high_removal";

const OPTIMIZER_DOCS: &str = "https://www.postgresql.org/docs/current/planner-optimizer.html";

/// Hash or Hash Join split into more than one batch
pub fn hash_join_memory_pressure(node: &PlanNode) -> DetectorResult {
    if !node.node_type.to_lowercase().contains("hash") {
        return Ok(None);
    }
    let Some(batches) = node.hash_batches.filter(|b| *b > 1) else {
        return Ok(None);
    };

    let location = node.location();
    let finding = Finding::new(
        HASH_JOIN_MEMORY_PRESSURE,
        "Hash Join Memory Pressure",
        Confidence::Verified,
        Impact::High,
    )
    .with_evidence(Evidence::new(
        "Hash Batches",
        batches,
        format!("Hash Batches: {} (spilled to disk)", batches),
        &location,
    ))
    .with_optional_evidence(node.hash_buckets.map(|buckets| {
        Evidence::new(
            "Hash Buckets",
            buckets,
            format!("Hash Buckets: {}", buckets),
            &location,
        )
    }))
    .with_optional_evidence(node.peak_memory_usage_kb.map(|kb| {
        Evidence::new(
            "Memory Usage",
            kb,
            format!("Memory Usage: {} kB", kb),
            &location,
        )
    }))
    .with_behavior(format!(
        "The hash table was split into {} batches, so data had to be written to temporary files on disk.",
        batches
    ))
    .with_explanation([
        "When a hash table exceeds work_mem, PostgreSQL splits the operation into multiple batches.",
        "Each batch beyond the first requires writing intermediate data to disk and re-reading it.",
        "This significantly increases I/O overhead and slows down the join operation.",
    ])
    .with_limitations([
        "Cannot see the current work_mem setting",
        "Cannot determine if increasing work_mem would fit in available RAM",
        "The actual I/O penalty depends on storage speed",
    ])
    .with_docs_link(WORK_MEM_DOCS);

    Ok(Some(finding))
}

/// Nested Loop whose inner side runs more than 100 times
pub fn high_freq_nested_loop(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::NestedLoop || node.children.len() < 2 {
        return Ok(None);
    }
    let inner = &node.children[1];
    let Some(loops) = inner.actual_loops.filter(|l| *l > 100) else {
        return Ok(None);
    };
    if !inner.is_valid() {
        return Err(DetectorError::MissingField {
            detector: HIGH_FREQ_NESTED_LOOP,
            field: "Node Type",
        });
    }

    let impact = if loops >= 1000 { Impact::High } else { Impact::Medium };
    let inner_location = inner.location();
    let inner_time = inner.actual_total_time_ms.filter(|ms| *ms > 0.0);
    let buffers = inner.buffers.shared_accessed();
    let target = inner
        .relation_name
        .as_deref()
        .unwrap_or(inner.node_type.as_str());

    let mut finding = Finding::new(
        HIGH_FREQ_NESTED_LOOP,
        "High-Iteration Nested Loop",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Inner Iterations",
        loops,
        format!("Inner side executed {} times", loops),
        &inner_location,
    ))
    .with_optional_evidence(inner_time.map(|ms| {
        Evidence::new(
            "Inner Time",
            ms,
            format!("Inner time per loop: {:.2} ms", ms),
            &inner_location,
        )
    }));

    if buffers > 0 {
        let amplification = buffers as f64 / loops as f64;
        finding = finding
            .with_evidence(Evidence::new(
                "Buffer Accesses",
                buffers,
                format!(
                    "Buffer accesses: {} ({} hit, {} read)",
                    buffers,
                    inner.buffers.shared_hit.unwrap_or(0),
                    inner.buffers.shared_read.unwrap_or(0)
                ),
                &inner_location,
            ))
            .with_evidence(Evidence::new(
                "Amplification",
                amplification,
                format!(
                    "Amplification: {:.1} buffer touches per iteration",
                    amplification
                ),
                "Computed",
            ));
    }

    let finding = finding
        .with_behavior(format!(
            "Nested Loop join with {} inner iterations on '{}'.",
            loops, target
        ))
        .with_explanation([
            format!("Inner {} executed {} times.", inner.node_type, loops),
            inner_time
                .map(|ms| format!("Inner execution per loop: {:.2} ms", ms))
                .unwrap_or_default(),
            if buffers > 0 {
                format!("Total buffer accesses: {}", buffers)
            } else {
                String::new()
            },
            "Nested Loop strategy executes the inner side once per outer row.".to_string(),
        ])
        .with_limitations([
            "Cannot determine if this join strategy was intentional (LATERAL, correlated subquery)",
            "Cannot assess if alternative join methods would fit in memory",
            "Inner side may be efficiently indexed despite high iteration count",
        ])
        .with_docs_link(OPTIMIZER_DOCS);

    Ok(Some(finding))
}

/// Join discarding most of its joined rows in a post-join filter
pub fn join_filter_high_removal(node: &PlanNode) -> DetectorResult {
    if !node.node_type.contains("Join") && !node.node_type.contains("Nested Loop") {
        return Ok(None);
    }
    let Some(removed) = node.rows_removed_by_join_filter.filter(|r| *r > 0) else {
        return Ok(None);
    };

    let output = check_finite(
        JOIN_FILTER_HIGH_REMOVAL,
        "Actual Rows",
        node.actual_rows.unwrap_or(0.0),
    )?;
    let removed_rows = removed as f64;
    let total = output + removed_rows;
    if total < 1000.0 {
        return Ok(None);
    }
    let ratio = removed_rows / total;
    if ratio <= 0.5 || removed <= 10_000 {
        return Ok(None);
    }

    let impact = if ratio > 0.9 { Impact::High } else { Impact::Medium };
    let location = node.location();
    let condition = |field: &str, value: &Option<String>| {
        value.as_deref().map(|v| {
            Evidence::new(field, v, format!("{}: {}", field, v), &location)
        })
    };

    let finding = Finding::new(
        JOIN_FILTER_HIGH_REMOVAL,
        "Excessive Join Filter Removal",
        Confidence::Inferred,
        impact,
    )
    .with_evidence(Evidence::new(
        "Rows Removed by Join Filter",
        removed,
        format!("Rows Removed by Join Filter: {}", removed),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Actual Rows",
        output,
        format!("Actual Rows Output: {}", output),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Filter Ratio",
        ratio,
        format!("{} of joined rows were discarded", percent(ratio)),
        "Computed",
    ))
    .with_optional_evidence(condition("Join Filter", &node.join_filter))
    .with_optional_evidence(condition("Hash Cond", &node.hash_cond))
    .with_optional_evidence(condition("Merge Cond", &node.merge_cond))
    .with_behavior(format!(
        "The {} produced {} rows but {} were discarded by a Join Filter.",
        node.node_type,
        total,
        percent(ratio)
    ))
    .with_explanation([
        "Join Filters are applied after the join operation, so PostgreSQL first joins all matching rows and then filters them.",
        "High removal rates suggest the filter condition could potentially be moved into the join condition itself.",
        "If the filter can be converted to a join condition, PostgreSQL can skip non-matching rows earlier.",
        "This pattern often occurs with complex join conditions or when WHERE clauses reference both tables.",
    ])
    .with_limitations([
        "Cannot determine if the filter can be converted to a join condition",
        "Some filters must remain as post-join filters due to NULL handling or expression complexity",
        "Cannot see if indexes exist that would help with a different join strategy",
    ])
    .with_docs_link(OPTIMIZER_DOCS);

    Ok(Some(finding))
}
