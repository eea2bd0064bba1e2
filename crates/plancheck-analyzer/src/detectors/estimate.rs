//! Planner estimate detector

use super::{DetectorResult, check_finite};
use crate::explain::PlanNode;
use plancheck_core::{Confidence, Evidence, Finding, Impact};

pub const ROW_COUNT_MISMATCH: &str = "row_count_mismatch";

/// Minimum absolute difference before a mismatch is worth reporting
const MIN_ROW_DIFF: f64 = 1000.0;
const MIN_PERCENT_DIFF: f64 = 10.0;
/// Estimate off by this factor or more is high impact
const HIGH_IMPACT_FACTOR: f64 = 10.0;

/// Planned and actual row counts differ by more than 10% and 1000 rows
pub fn row_count_mismatch(node: &PlanNode) -> DetectorResult {
    let (Some(planned), Some(actual)) = (node.plan_rows, node.actual_rows) else {
        return Ok(None);
    };
    let planned = check_finite(ROW_COUNT_MISMATCH, "Plan Rows", planned)?;
    let actual = check_finite(ROW_COUNT_MISMATCH, "Actual Rows", actual)?;
    if actual <= 0.0 {
        return Ok(None);
    }

    let baseline = if planned > 0.0 { planned } else { actual };
    let diff = (actual - planned).abs();
    let percent_off = diff / baseline * 100.0;
    if percent_off <= MIN_PERCENT_DIFF || diff <= MIN_ROW_DIFF {
        return Ok(None);
    }

    let factor = if planned > 0.0 {
        actual.max(planned) / actual.min(planned)
    } else {
        f64::INFINITY
    };
    let impact = if factor >= HIGH_IMPACT_FACTOR {
        Impact::High
    } else {
        Impact::Medium
    };

    let location = node.location();
    let finding = Finding::new(
        ROW_COUNT_MISMATCH,
        "Significant Row Mismatch",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Plan Rows",
        planned,
        format!("Plan Rows: {}", planned),
        &location,
    ))
    .with_evidence(Evidence::new(
        "Actual Rows",
        actual,
        format!("Actual Rows: {}", actual),
        &location,
    ))
    .with_behavior("The optimizer's estimated row count significantly differed from reality.")
    .with_explanation([
        "PostgreSQL chooses join types and scan methods based on row estimates.".to_string(),
        format!("The estimate was off by {:.1}% ({} rows).", percent_off, diff),
        "Stale statistics or complex join conditions often cause this drift.".to_string(),
    ])
    .with_limitations([
        "Cannot see if ANALYZE has been run recently",
        "Do not know the internal cost model parameters",
        "Cannot determine if this mismatch led to a suboptimal join choice in this specific case",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/planner-stats.html");

    Ok(Some(finding))
}
