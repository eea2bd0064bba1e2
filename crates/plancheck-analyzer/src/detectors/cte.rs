//! CTE detectors: materialized CTE scans and runaway recursion

use super::{DetectorResult, check_finite, percent};
use crate::explain::{NodeType, PlanNode};
use plancheck_core::{Confidence, Evidence, Finding, Impact};

pub const CTE_MATERIALIZATION: &str = "cte_materialization";
pub const RECURSIVE_ITERATION_EXPLOSION: &str = "recursive_iteration_explosion";

const MIN_CTE_ROWS: f64 = 1000.0;
const MIN_RECURSIVE_LOOPS: u64 = 10_000;
const HIGH_RECURSIVE_LOOPS: u64 = 50_000;

fn cte_impact(rows: f64, time_ms: f64) -> Impact {
    if rows >= 100_000_000.0 || time_ms >= 5000.0 {
        Impact::High
    } else if rows >= 1_000_000.0 || time_ms >= 1000.0 {
        Impact::Medium
    } else {
        Impact::Low
    }
}

/// CTE Scan over at least 1000 materialized rows
pub fn cte_materialization(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::CteScan {
        return Ok(None);
    }
    let Some(rows) = node.actual_rows else {
        return Ok(None);
    };
    let rows = check_finite(CTE_MATERIALIZATION, "Actual Rows", rows)?;
    if rows < MIN_CTE_ROWS {
        return Ok(None);
    }

    let time_ms = node.actual_total_time_ms.unwrap_or(0.0);
    let cte_name = node.cte_name.as_deref().unwrap_or("unnamed");
    let location = node.location();

    let finding = Finding::new(
        CTE_MATERIALIZATION,
        "CTE Materialization Overhead",
        Confidence::Verified,
        cte_impact(rows, time_ms),
    )
    .with_evidence(Evidence::new(
        "CTE Name",
        cte_name,
        format!("CTE: {}", cte_name),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Rows",
        rows,
        format!("{} rows materialized", rows),
        &location,
    ))
    .with_optional_evidence((time_ms > 0.0).then(|| {
        Evidence::new(
            "Actual Total Time",
            time_ms,
            format!("Actual Total Time: {:.2} ms", time_ms),
            &location,
        )
    }))
    .with_behavior(format!(
        "The CTE '{}' is materialized to temporary storage ({} rows).",
        cte_name, rows
    ))
    .with_explanation([
        "PostgreSQL can materialize CTEs, creating an optimization fence.",
        "This adds I/O overhead but can be beneficial if the CTE is referenced multiple times.",
        "A CTE used only once can be inlined as a subquery or marked NOT MATERIALIZED (PostgreSQL 12+).",
    ])
    .with_limitations([
        "Cannot determine how many times the CTE is referenced",
        "Cannot see the original SQL to verify if materialization is intentional",
        "Materialization may be optimal for complex CTEs referenced multiple times",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/queries-with.html");

    Ok(Some(finding))
}

/// WorkTable Scan iterated at least 10 000 times
pub fn recursive_iteration_explosion(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::WorkTableScan {
        return Ok(None);
    }
    let loops = node.actual_loops.unwrap_or(1);
    if loops < MIN_RECURSIVE_LOOPS {
        return Ok(None);
    }

    let rows_per_loop = check_finite(
        RECURSIVE_ITERATION_EXPLOSION,
        "Actual Rows",
        node.actual_rows.unwrap_or(0.0),
    )?;
    let time_ms = node.actual_total_time_ms.unwrap_or(0.0);
    let total_rows = rows_per_loop * loops as f64;
    let removed_total = node.rows_removed_by_filter.unwrap_or(0) as f64 * loops as f64;
    let examined = total_rows + removed_total;
    let rejection = if examined > 0.0 {
        removed_total / examined
    } else {
        0.0
    };

    let impact = if loops >= HIGH_RECURSIVE_LOOPS || time_ms > 1000.0 {
        Impact::High
    } else {
        Impact::Medium
    };
    let location = node.location();

    let finding = Finding::new(
        RECURSIVE_ITERATION_EXPLOSION,
        "Recursive Iteration Explosion",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Recursive Iterations",
        loops,
        format!("{} iterations", loops),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Rows Per Iteration",
        rows_per_loop,
        format!("{} rows per loop", rows_per_loop),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Total Rows Processed",
        total_rows,
        format!("{} total rows ({} x {})", total_rows, rows_per_loop, loops),
        "Computed",
    ))
    .with_optional_evidence((node.filter.is_some() && removed_total > 0.0).then(|| {
        Evidence::new(
            "Filter Rejection",
            rejection,
            format!("{} rejected ({} rows)", percent(rejection), removed_total),
            "Computed",
        )
    }))
    .with_optional_evidence((time_ms > 0.0).then(|| {
        Evidence::new(
            "Execution Time",
            time_ms,
            format!("{:.2} ms", time_ms),
            &location,
        )
    }))
    .with_behavior(format!(
        "A WorkTable Scan is executing {} iterations, processing {} total rows.",
        loops, total_rows
    ))
    .with_explanation([
        "In recursive CTEs, the WorkTable Scan reads from the previous iteration's results.".to_string(),
        format!(
            "{} iterations indicates extremely deep recursion; hierarchies are usually much shallower.",
            loops
        ),
        if rejection > 0.99 {
            format!(
                "{} of rows are being rejected by the filter, so the join condition matches very few rows per iteration.",
                percent(rejection)
            )
        } else {
            format!(
                "Each iteration processes {} rows, which compounds to {} total.",
                rows_per_loop, total_rows
            )
        },
        "This pattern often indicates circular references in data, missing CYCLE detection or an unbounded recursive query.".to_string(),
    ])
    .with_limitations([
        "Cannot determine if CYCLE detection is configured.",
        "Cannot see the actual recursive CTE query structure.",
        "Data quality issues (circular references) require data inspection.",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/queries-with.html#QUERIES-WITH-CYCLE");

    Ok(Some(finding))
}
