//! Detector Registry
//!
//! Each detector is a pure function over a single plan node. It either
//! returns a finding, declines with `Ok(None)`, or reports a fault with a
//! `DetectorError`. Detectors never see the rest of the tree except through
//! the node's own children.
//!
//! The registry order is stable; the aggregator uses it to break ties
//! between findings of equal impact.

pub mod cte;
pub mod estimate;
pub mod join;
pub mod overhead;
pub mod parallel;
pub mod scan;
pub mod sort;

use crate::explain::PlanNode;
use plancheck_core::{DetectorError, Finding};
use std::fmt;

/// Outcome of running one detector on one node
pub type DetectorResult = Result<Option<Finding>, DetectorError>;

/// A named detection rule
#[derive(Clone, Copy)]
pub struct Detector {
    pub id: &'static str,
    pub run: fn(&PlanNode) -> DetectorResult,
}

impl Detector {
    pub const fn new(id: &'static str, run: fn(&PlanNode) -> DetectorResult) -> Self {
        Self { id, run }
    }

    /// Runs the rule against a node
    pub fn evaluate(&self, node: &PlanNode) -> DetectorResult {
        (self.run)(node)
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector").field("id", &self.id).finish()
    }
}

/// Returns the built-in detectors in evaluation order
pub fn default_registry() -> Vec<Detector> {
    vec![
        Detector::new(sort::DISK_SPILL, sort::disk_spill),
        Detector::new(sort::SORT_DISK_USAGE, sort::sort_disk_usage),
        Detector::new(join::HASH_JOIN_MEMORY_PRESSURE, join::hash_join_memory_pressure),
        Detector::new(scan::MISSING_INDEX, scan::missing_index),
        Detector::new(scan::UNFILTERED_SEQ_SCAN, scan::unfiltered_seq_scan),
        Detector::new(estimate::ROW_COUNT_MISMATCH, estimate::row_count_mismatch),
        Detector::new(join::HIGH_FREQ_NESTED_LOOP, join::high_freq_nested_loop),
        Detector::new(sort::INEFFECTIVE_LIMIT, sort::ineffective_limit),
        Detector::new(scan::INDEX_SCAN_HEAP_FETCHES, scan::index_scan_heap_fetches),
        Detector::new(
            parallel::PARALLEL_QUERY_WORKER_SHORTAGE,
            parallel::parallel_query_worker_shortage,
        ),
        Detector::new(scan::BITMAP_HEAP_LOSSY_RECHECK, scan::bitmap_heap_lossy_recheck),
        Detector::new(join::JOIN_FILTER_HIGH_REMOVAL, join::join_filter_high_removal),
        Detector::new(cte::CTE_MATERIALIZATION, cte::cte_materialization),
        Detector::new(
            cte::RECURSIVE_ITERATION_EXPLOSION,
            cte::recursive_iteration_explosion,
        ),
        Detector::new(overhead::JIT_COMPILATION_OVERHEAD, overhead::jit_compilation_overhead),
        Detector::new(overhead::TRIGGER_OVERHEAD, overhead::trigger_overhead),
    ]
}

/// Documentation for work_mem, shared by the memory related detectors
pub(crate) const WORK_MEM_DOCS: &str =
    "https://www.postgresql.org/docs/current/runtime-config-resource.html#GUC-WORK-MEM";

/// Rejects NaN and infinite plan numbers
pub(crate) fn check_finite(
    detector: &'static str,
    field: &str,
    value: f64,
) -> Result<f64, DetectorError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DetectorError::Invalid {
            detector,
            message: format!("{} is not a finite number ({})", field, value),
        })
    }
}

/// Renders a ratio as a percentage with one decimal
pub(crate) fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}
