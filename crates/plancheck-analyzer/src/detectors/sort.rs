//! Sort detectors: disk spills and sorts feeding a LIMIT

use super::{DetectorResult, WORK_MEM_DOCS};
use crate::explain::{NodeType, PlanNode, SortSpaceType};
use plancheck_core::{Confidence, Evidence, Finding, Impact};

pub const DISK_SPILL: &str = "disk_spill";
pub const SORT_DISK_USAGE: &str = "sort_disk_usage";
pub const INEFFECTIVE_LIMIT: &str = "ineffective_limit";

/// 100 MB in kB
const LARGE_SPILL_KB: u64 = 102_400;
const LARGE_QUICKSORT_ROWS: f64 = 10_000.0;

fn is_external_merge(method: &str) -> bool {
    method.contains("external merge")
}

/// Sort that fell back to an external merge on disk
pub fn disk_spill(node: &PlanNode) -> DetectorResult {
    let Some(method) = node.sort_method.as_deref() else {
        return Ok(None);
    };
    if !is_external_merge(method) {
        return Ok(None);
    }

    let location = node.location();
    let space_kb = node.sort_space_used_kb.filter(|kb| *kb > 0);
    let space_type = node
        .sort_space_type
        .unwrap_or(SortSpaceType::Disk)
        .as_str();

    let behavior = match space_kb {
        Some(kb) => format!(
            "External merge sort detected. Temporary disk space used: {} MB.",
            kb / 1024
        ),
        None => "External merge sort detected. Data was written to temporary files.".to_string(),
    };

    let finding = Finding::new(DISK_SPILL, "Disk Spill Detected", Confidence::Verified, Impact::High)
        .with_evidence(Evidence::new(
            "Sort Method",
            method,
            format!("Sort Method: {}", method),
            &location,
        ))
        .with_optional_evidence(space_kb.map(|kb| {
            Evidence::new(
                "Sort Space Used",
                kb,
                format!("Sort Space Used: {} kB ({} MB, {})", kb, kb / 1024, space_type),
                &location,
            )
        }))
        .with_behavior(behavior)
        .with_explanation([
            format!("Sort method: {}", method),
            space_kb
                .map(|kb| format!("Disk space utilized: {} kB ({} MB)", kb, kb / 1024))
                .unwrap_or_default(),
            "External merge indicates the sort exceeded available work_mem.".to_string(),
            "Temporary files were created to complete the sort operation.".to_string(),
        ])
        .with_limitations([
            "Cannot see current work_mem setting",
            "Cannot determine if disk-based sort was expected for this workload",
            "Cannot measure actual I/O latency without system-level metrics",
        ])
        .with_docs_link(WORK_MEM_DOCS);

    Ok(Some(finding))
}

/// Sort node reporting disk space without an external merge
pub fn sort_disk_usage(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::Sort || node.sort_space_type != Some(SortSpaceType::Disk) {
        return Ok(None);
    }
    if node.sort_method.as_deref().is_some_and(is_external_merge) {
        return Ok(None);
    }

    let location = node.location();
    let space_kb = node.sort_space_used_kb.unwrap_or(0);
    let space_mb = space_kb as f64 / 1024.0;
    let large = space_kb > LARGE_SPILL_KB;
    let impact = if large { Impact::High } else { Impact::Medium };

    let finding = Finding::new(SORT_DISK_USAGE, "Sort Using Disk Storage", Confidence::Verified, impact)
        .with_evidence(Evidence::new(
            "Sort Space Type",
            "Disk",
            "Sort Space Type: Disk",
            &location,
        ))
        .with_optional_evidence(node.sort_space_used_kb.map(|kb| {
            Evidence::new(
                "Sort Space Used",
                kb,
                format!("Sort Space Used: {} kB ({:.2} MB)", kb, space_mb),
                &location,
            )
        }))
        .with_optional_evidence(node.sort_method.as_deref().map(|method| {
            Evidence::new("Sort Method", method, format!("Sort Method: {}", method), &location)
        }))
        .with_optional_evidence((!node.sort_keys.is_empty()).then(|| {
            let keys = node.sort_keys.join(", ");
            Evidence::new("Sort Key", keys.as_str(), format!("Sort Key: {}", keys), &location)
        }))
        .with_behavior(format!(
            "The Sort operation spilled {:.2} MB to disk because it exceeded available memory.",
            space_mb
        ))
        .with_explanation([
            "PostgreSQL's work_mem setting limits how much memory each sort operation can use.",
            "When sort data exceeds work_mem, PostgreSQL writes temporary files to disk.",
            "Disk-based sorts are significantly slower than in-memory sorts due to I/O overhead.",
            if large {
                "This sort used over 100 MB of disk space; work_mem would need a significant increase to keep it in memory."
            } else {
                "A larger work_mem for this session would keep the sort in memory."
            },
        ])
        .with_limitations([
            "Cannot see the current work_mem setting",
            "Cannot determine if this query can be rewritten to avoid sorting",
            "Cannot see if an index could provide pre-sorted data",
        ])
        .with_docs_link(WORK_MEM_DOCS);

    Ok(Some(finding))
}

/// LIMIT applied on top of a full sort of a large input
pub fn ineffective_limit(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::Limit {
        return Ok(None);
    }
    let Some(child) = node.children.first() else {
        return Ok(None);
    };
    if child.kind() != NodeType::Sort {
        return Ok(None);
    }
    let Some(method) = child.sort_method.as_deref() else {
        return Ok(None);
    };

    let lower = method.to_ascii_lowercase();
    let rows = child.actual_rows.or(child.plan_rows).unwrap_or(0.0);
    let external = lower.contains("external");
    let large_quicksort = lower.contains("quicksort") && rows > LARGE_QUICKSORT_ROWS;
    if !external && !large_quicksort {
        return Ok(None);
    }

    let finding = Finding::new(INEFFECTIVE_LIMIT, "Ineffective LIMIT", Confidence::Inferred, Impact::Medium)
        .with_evidence(Evidence::new(
            "Sort Method",
            method,
            format!("Child Sort Method: {}", method),
            child.location(),
        ))
        .with_evidence(Evidence::new(
            "Rows",
            rows,
            format!("Rows sorted before the limit: {}", rows),
            child.location(),
        ))
        .with_behavior("The LIMIT clause is being applied after a full sort operation.")
        .with_explanation([
            "PostgreSQL is sorting the entire result set before discarding most of it.",
            "An efficient top-N sort (a bounded heap) was not used, likely due to sort memory constraints or complex expressions.",
        ])
        .with_limitations([
            "Cannot see effective work_mem during sort",
            "Do not know if the sort key is indexed",
            "Cannot determine if Top-N heapsort was actually available for this query plan",
        ])
        .with_docs_link("https://www.postgresql.org/docs/current/queries-limit.html");

    Ok(Some(finding))
}
