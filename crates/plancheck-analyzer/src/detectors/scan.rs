//! Scan detectors: sequential scans, heap fetches and lossy bitmaps

use super::{DetectorResult, check_finite, percent};
use crate::explain::{NodeType, PlanNode};
use plancheck_core::{Confidence, Evidence, Finding, Impact};
use regex::Regex;
use std::sync::LazyLock;

pub const MISSING_INDEX: &str = "missing_index";
pub const UNFILTERED_SEQ_SCAN: &str = "unfiltered_seq_scan";
pub const INDEX_SCAN_HEAP_FETCHES: &str = "index_scan_heap_fetches";
pub const BITMAP_HEAP_LOSSY_RECHECK: &str = "bitmap_heap_lossy_recheck";

const INDEX_DOCS: &str = "https://www.postgresql.org/docs/current/indexes-examine.html";

static IS_NULL_FILTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)IS\s+NULL").expect("valid regex"));

/// Seq Scan whose filter discards more than 90% of a non-trivial table
pub fn missing_index(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::SeqScan {
        return Ok(None);
    }
    let Some(filter) = node.filter.as_deref() else {
        return Ok(None);
    };
    let Some(removed) = node.rows_removed_by_filter.filter(|r| *r > 0) else {
        return Ok(None);
    };
    let Some(actual) = node.actual_rows else {
        return Ok(None);
    };
    let actual = check_finite(MISSING_INDEX, "Actual Rows", actual)?;

    // Root lookups such as `parent_id IS NULL` are expected to return a handful of rows
    if IS_NULL_FILTER.is_match(filter) && actual <= 10.0 {
        return Ok(None);
    }

    let removed_rows = removed as f64;
    let total = actual + removed_rows;
    if total <= 1000.0 {
        return Ok(None);
    }
    let ratio = removed_rows / total;
    if ratio <= 0.9 {
        return Ok(None);
    }

    let relation = node.relation_name.as_deref().unwrap_or("the table");
    let pct = percent(ratio);

    let finding = Finding::new(
        MISSING_INDEX,
        "Missing Index Opportunity",
        Confidence::Inferred,
        Impact::High,
    )
    .with_evidence(Evidence::new(
        "Filter Ratio",
        ratio,
        format!("{} of rows filtered out ({} of {})", pct, removed, total),
        node.location(),
    ))
    .with_evidence(Evidence::new(
        "Filter",
        filter,
        format!("Filter: {}", filter),
        node.location(),
    ))
    .with_behavior(format!(
        "PostgreSQL is performing a Sequential Scan on {} but filtering out almost all rows ({}).",
        relation, pct
    ))
    .with_explanation([
        "A Sequential Scan reads the entire table from disk or memory.".to_string(),
        format!(
            "Since {} of the data is being discarded by a filter, an index on the filtered columns could let PostgreSQL skip most of the table.",
            pct
        ),
        format!("The filter being used is: {}", filter),
    ])
    .with_limitations([
        "We cannot see which indexes already exist on this table.",
        "An index might already exist but be ignored due to low selectivity or other optimizer choices.",
        "Adding an index has a write-performance cost that must be balanced.",
    ])
    .with_docs_link(INDEX_DOCS);

    Ok(Some(finding))
}

/// Seq Scan without any filter over more than 1000 rows
pub fn unfiltered_seq_scan(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::SeqScan || node.filter.is_some() {
        return Ok(None);
    }
    let rows = node.actual_rows.or(node.plan_rows).unwrap_or(0.0);
    let rows = check_finite(UNFILTERED_SEQ_SCAN, "Rows", rows)?;
    if rows <= 1000.0 {
        return Ok(None);
    }

    let slow = node.actual_total_time_ms.is_some_and(|ms| ms > 1000.0);
    let impact = if rows >= 100_000.0 || slow {
        Impact::High
    } else {
        Impact::Medium
    };

    let finding = Finding::new(
        UNFILTERED_SEQ_SCAN,
        "Unfiltered Seq Scan",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Node Type",
        "Seq Scan",
        "Seq Scan",
        node.location(),
    ))
    .with_evidence(Evidence::new(
        "Filter",
        "None",
        "Filter: [Empty]",
        node.location(),
    ))
    .with_evidence(Evidence::new(
        "Rows",
        rows,
        format!("Rows: {}", rows),
        node.location(),
    ))
    .with_optional_evidence(node.actual_total_time_ms.filter(|_| slow).map(|ms| {
        Evidence::new(
            "Actual Total Time",
            ms,
            format!("Actual Total Time: {:.2} ms", ms),
            node.location(),
        )
    }))
    .with_behavior("PostgreSQL is scanning the entire table without any filter predicates.")
    .with_explanation([
        "This operation reads every block of the relation from disk or buffer cache.",
        "If the table is large, this will be significantly slower than an Index Scan.",
        "Even if an index exists, the optimizer may choose a Seq Scan if it expects to return a large percentage of the table.",
    ])
    .with_limitations([
        "Cannot see if indexes exist on this table",
        "Do not know if the table resides entirely in RAM (Buffer Cache)",
        "Cannot determine if a Seq Scan is actually cheaper for this specific data distribution",
    ])
    .with_docs_link(INDEX_DOCS);

    Ok(Some(finding))
}

/// Index or bitmap heap scan that visits the heap for most of its rows
pub fn index_scan_heap_fetches(node: &PlanNode) -> DetectorResult {
    if !matches!(node.kind(), NodeType::IndexScan | NodeType::BitmapHeapScan) {
        return Ok(None);
    }
    let (Some(fetches), Some(actual)) = (node.heap_fetches, node.actual_rows) else {
        return Ok(None);
    };
    let actual = check_finite(INDEX_SCAN_HEAP_FETCHES, "Actual Rows", actual)?;
    if actual <= 100.0 {
        return Ok(None);
    }

    let ratio = fetches as f64 / actual;
    if ratio <= 0.5 || fetches <= 1000 {
        return Ok(None);
    }

    let relation = node.relation_name.as_deref().unwrap_or("the table");
    let index_location = match &node.index_name {
        Some(index) => format!("{} using {}", node.location(), index),
        None => node.location(),
    };

    let finding = Finding::new(
        INDEX_SCAN_HEAP_FETCHES,
        "Index Scan with High Heap Fetches",
        Confidence::Inferred,
        Impact::Medium,
    )
    .with_evidence(Evidence::new(
        "Heap Fetches",
        fetches,
        format!("Heap Fetches: {}", fetches),
        node.location(),
    ))
    .with_evidence(Evidence::new(
        "Actual Rows",
        actual,
        format!("Actual Rows: {}", actual),
        index_location,
    ))
    .with_evidence(Evidence::new(
        "Fetch Ratio",
        ratio,
        format!("Fetch Ratio: {} of rows required heap access", percent(ratio)),
        "Computed",
    ))
    .with_behavior(format!(
        "The index scan on {} required {} heap fetches to retrieve {} rows.",
        relation, fetches, actual
    ))
    .with_explanation([
        "Heap fetches occur when the index doesn't contain all required columns (not a covering index).",
        "Each heap fetch is a random I/O operation to retrieve the full row from the table.",
        "An Index-Only Scan could avoid these fetches if the index included all needed columns.",
        "A covering index with an INCLUDE clause can store the additional columns.",
    ])
    .with_limitations([
        "Cannot see which columns are being selected",
        "Cannot determine if a covering index already exists",
        "Index-Only Scans also require the visibility map to be up-to-date (run VACUUM)",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/indexes-index-only-scans.html");

    Ok(Some(finding))
}

/// Bitmap heap scan whose lossy pages forced a recheck of many rows
pub fn bitmap_heap_lossy_recheck(node: &PlanNode) -> DetectorResult {
    if node.kind() != NodeType::BitmapHeapScan {
        return Ok(None);
    }
    let Some(removed) = node.rows_removed_by_index_recheck.filter(|r| *r > 0) else {
        return Ok(None);
    };

    let actual = check_finite(
        BITMAP_HEAP_LOSSY_RECHECK,
        "Actual Rows",
        node.actual_rows.unwrap_or(0.0),
    )?;
    let removed_rows = removed as f64;
    let total = actual + removed_rows;
    if total < 1000.0 {
        return Ok(None);
    }
    let ratio = removed_rows / total;
    if ratio <= 0.1 {
        return Ok(None);
    }

    let impact = if ratio > 0.5 { Impact::High } else { Impact::Medium };
    let relation = node.relation_name.as_deref().unwrap_or("the table");

    let finding = Finding::new(
        BITMAP_HEAP_LOSSY_RECHECK,
        "Bitmap Heap Scan Lossy Pages",
        Confidence::Verified,
        impact,
    )
    .with_evidence(Evidence::new(
        "Rows Removed by Index Recheck",
        removed,
        format!("Rows Removed by Index Recheck: {}", removed),
        node.location(),
    ))
    .with_evidence(Evidence::new(
        "Recheck Ratio",
        ratio,
        format!("{} of scanned rows were filtered by recheck", percent(ratio)),
        "Computed",
    ))
    .with_optional_evidence(node.recheck_cond.as_deref().map(|cond| {
        Evidence::new(
            "Recheck Cond",
            cond,
            format!("Recheck Cond: {}", cond),
            node.location(),
        )
    }))
    .with_behavior(format!(
        "The Bitmap Heap Scan on {} had to recheck {} rows and discard them.",
        relation, removed
    ))
    .with_explanation([
        "When a bitmap index scan exceeds work_mem, it becomes lossy and stores only page numbers instead of exact row locations.".to_string(),
        "Lossy pages require PostgreSQL to re-read the entire page and recheck every row against the original condition.".to_string(),
        format!(
            "This {} recheck overhead indicates significant extra I/O and CPU work.",
            percent(ratio)
        ),
        "Increasing work_mem can help keep the bitmap exact rather than lossy.".to_string(),
    ])
    .with_limitations([
        "Cannot see the current work_mem setting",
        "Cannot determine the exact bitmap size",
        "Cannot measure how much of the bitmap was lossy vs exact",
    ])
    .with_docs_link("https://www.postgresql.org/docs/current/indexes-bitmap-scans.html");

    Ok(Some(finding))
}
