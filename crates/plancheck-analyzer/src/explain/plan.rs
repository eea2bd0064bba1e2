//! Plan Model - the canonical, format-independent plan tree
//!
//! Every input shape (EXPLAIN JSON, TEXT, pgAdmin exports, primary parser
//! results) is normalized into `PlanNode`. Named fields cover the properties
//! the detectors read; anything else lands in `extra`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deepest node level the parsers build; anything below becomes a parse
/// error node
pub const MAX_PLAN_DEPTH: usize = 100;

/// Where the tree of an `AnalysisInput` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseSource {
    /// The injected primary parser produced the tree
    Primary,
    /// One of the built-in fallback stages produced the tree
    Fallback,
}

/// Output of the normalizer and input of the detection engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    pub source: ParseSource,
    /// Planning time in milliseconds (if available)
    pub planning_time_ms: Option<f64>,
    /// Execution time in milliseconds (if available, from EXPLAIN ANALYZE)
    pub execution_time_ms: Option<f64>,
    /// Root of the (first) plan
    pub tree: PlanNode,
    /// Further independent plans when the input held several
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_plans: Vec<PlanNode>,
}

impl AnalysisInput {
    /// Creates an input for a single tree without timings
    pub fn new(source: ParseSource, tree: PlanNode) -> Self {
        Self {
            source,
            planning_time_ms: None,
            execution_time_ms: None,
            tree,
            additional_plans: Vec::new(),
        }
    }

    /// Sets the planning time
    pub fn with_planning_time(mut self, ms: Option<f64>) -> Self {
        self.planning_time_ms = ms;
        self
    }

    /// Sets the execution time
    pub fn with_execution_time(mut self, ms: Option<f64>) -> Self {
        self.execution_time_ms = ms;
        self
    }

    /// Iterates over every top-level plan, the main tree first
    pub fn plans(&self) -> impl Iterator<Item = &PlanNode> {
        std::iter::once(&self.tree).chain(self.additional_plans.iter())
    }

    /// Returns true if the input holds more than one independent plan
    pub fn is_multi_plan(&self) -> bool {
        !self.additional_plans.is_empty()
    }

    /// Returns true if no stage could parse the input
    pub fn is_parse_error(&self) -> bool {
        self.tree.node_type == PlanNode::PARSE_ERROR
    }

    /// Returns an iterator over all nodes of the main tree (depth-first)
    pub fn iter_nodes(&self) -> PlanNodeIterator<'_> {
        PlanNodeIterator::new(&self.tree)
    }
}

/// Represents a single node in the plan tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// PostgreSQL node label, e.g. "Seq Scan"; empty for malformed nodes
    pub node_type: String,
    /// Free-text description (used by the parse error node)
    pub description: Option<String>,
    /// Relation/table name (if applicable)
    pub relation_name: Option<String>,
    /// Schema name (if applicable)
    pub schema: Option<String>,
    /// Alias used in the query (if applicable)
    pub alias: Option<String>,
    /// Index name used (for index scans)
    pub index_name: Option<String>,
    /// CTE name (for CTE and work table scans)
    pub cte_name: Option<String>,
    /// Outer, Inner, Member, SubPlan, InitPlan
    pub parent_relationship: Option<String>,
    /// Join type (for joins)
    pub join_type: Option<JoinType>,
    /// Aggregate or set-op strategy (Plain, Sorted, Hashed, Mixed)
    pub strategy: Option<String>,
    /// ModifyTable operation (Insert, Update, Delete, Merge)
    pub operation: Option<String>,
    /// Forward or Backward for index scans
    pub scan_direction: Option<String>,
    /// Partial or Finalize for parallel aggregates
    pub partial_mode: Option<String>,
    pub parallel_aware: Option<bool>,
    /// Cost information
    pub cost: Option<NodeCost>,
    /// Estimated number of rows
    pub plan_rows: Option<f64>,
    /// Estimated width of each row in bytes
    pub plan_width: Option<u32>,
    pub actual_startup_time_ms: Option<f64>,
    pub actual_total_time_ms: Option<f64>,
    /// Actual rows returned per loop (from EXPLAIN ANALYZE)
    pub actual_rows: Option<f64>,
    pub actual_loops: Option<u64>,
    /// Filter condition applied
    pub filter: Option<String>,
    pub rows_removed_by_filter: Option<u64>,
    /// Sort method used (from EXPLAIN ANALYZE)
    pub sort_method: Option<String>,
    pub sort_space_used_kb: Option<u64>,
    pub sort_space_type: Option<SortSpaceType>,
    /// Sort keys (for sort operations)
    pub sort_keys: Vec<String>,
    pub hash_buckets: Option<u64>,
    pub hash_batches: Option<u64>,
    pub peak_memory_usage_kb: Option<u64>,
    pub heap_fetches: Option<u64>,
    pub workers_planned: Option<u64>,
    pub workers_launched: Option<u64>,
    pub index_cond: Option<String>,
    pub recheck_cond: Option<String>,
    pub join_filter: Option<String>,
    pub hash_cond: Option<String>,
    pub merge_cond: Option<String>,
    pub rows_removed_by_index_recheck: Option<u64>,
    pub rows_removed_by_join_filter: Option<u64>,
    /// Block counters (from EXPLAIN (ANALYZE, BUFFERS))
    pub buffers: BufferCounters,
    /// Trigger timings, in the order they were reported
    pub triggers: Vec<TriggerTiming>,
    /// JIT compilation summary
    pub jit: Option<JitInfo>,
    /// Group keys (for aggregations)
    pub group_keys: Vec<String>,
    /// Output columns (from EXPLAIN VERBOSE)
    pub output: Vec<String>,
    /// Child nodes
    pub children: Vec<PlanNode>,
    /// Additional properties not captured by specific fields
    pub extra: HashMap<String, serde_json::Value>,
}

impl PlanNode {
    /// Node type of the terminal node produced when nothing could be parsed
    pub const PARSE_ERROR: &'static str = "Parse Error";

    /// Creates a new plan node with the given type
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Creates the terminal parse error node
    pub fn parse_error(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::new(Self::PARSE_ERROR)
        }
    }

    /// Stands in for a subtree nested deeper than [`MAX_PLAN_DEPTH`]
    pub fn too_deep() -> Self {
        Self::parse_error(format!(
            "Plan nests deeper than {} levels; the rest was not parsed.",
            MAX_PLAN_DEPTH
        ))
    }

    /// A node is valid iff it carries a node type
    pub fn is_valid(&self) -> bool {
        !self.node_type.trim().is_empty()
    }

    /// Classifies the node type label
    pub fn kind(&self) -> NodeType {
        NodeType::from_label(&self.node_type)
    }

    /// Sets the relation/table name
    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation_name = Some(relation.into());
        self
    }

    /// Sets the cost information
    pub fn with_cost(mut self, startup: f64, total: f64) -> Self {
        self.cost = Some(NodeCost { startup, total });
        self
    }

    /// Sets the estimated rows
    pub fn with_plan_rows(mut self, rows: f64) -> Self {
        self.plan_rows = Some(rows);
        self
    }

    /// Sets the actual rows and loops
    pub fn with_actuals(mut self, rows: f64, loops: u64) -> Self {
        self.actual_rows = Some(rows);
        self.actual_loops = Some(loops);
        self
    }

    /// Sets the actual total time
    pub fn with_actual_total_time(mut self, ms: f64) -> Self {
        self.actual_total_time_ms = Some(ms);
        self
    }

    /// Adds a child node
    pub fn with_child(mut self, child: PlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the index name
    #[cfg(test)]
    pub fn with_index(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Sets the filter condition
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Returns the total number of nodes in this subtree (including self)
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Human-readable pointer to this node for evidence locations
    pub fn location(&self) -> String {
        match (&self.relation_name, &self.cte_name) {
            (Some(rel), _) => format!("{} on {}", self.node_type, rel),
            (None, Some(cte)) => format!("{} on {}", self.node_type, cte),
            (None, None) => format!("Node Type: {}", self.node_type),
        }
    }

    /// Sum of all trigger time on this node, in milliseconds
    pub fn total_trigger_time_ms(&self) -> f64 {
        self.triggers.iter().map(|t| t.total_time_ms).sum()
    }
}

/// Cost information for a plan node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct NodeCost {
    /// Startup cost (time to return first row)
    pub startup: f64,
    /// Total cost (time to return all rows)
    pub total: f64,
}

impl NodeCost {
    /// Creates a new cost with startup and total values
    pub fn new(startup: f64, total: f64) -> Self {
        Self { startup, total }
    }

    /// Returns the execution cost (total - startup)
    pub fn execution(&self) -> f64 {
        self.total - self.startup
    }
}

/// Where a sort kept its working set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortSpaceType {
    Memory,
    Disk,
}

impl SortSpaceType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "disk" => Some(Self::Disk),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "Memory",
            Self::Disk => "Disk",
        }
    }
}

/// Shared and temp block counters from EXPLAIN (BUFFERS)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCounters {
    pub shared_hit: Option<u64>,
    pub shared_read: Option<u64>,
    pub shared_dirtied: Option<u64>,
    pub shared_written: Option<u64>,
    pub temp_read: Option<u64>,
    pub temp_written: Option<u64>,
}

impl BufferCounters {
    /// Returns true if no counter was reported
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shared blocks touched, hit or read
    pub fn shared_accessed(&self) -> u64 {
        self.shared_hit.unwrap_or(0) + self.shared_read.unwrap_or(0)
    }
}

/// Time spent in one trigger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerTiming {
    pub name: String,
    pub total_time_ms: f64,
    pub calls: u64,
    pub relation: Option<String>,
}

/// JIT compilation summary
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JitInfo {
    pub functions: Option<u64>,
    /// Options as printed, e.g. "Inlining true, Optimization true"
    pub options_text: Option<String>,
    pub timing: Option<JitTiming>,
}

/// JIT phase timings in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JitTiming {
    pub generation: Option<f64>,
    pub inlining: Option<f64>,
    pub optimization: Option<f64>,
    pub emission: Option<f64>,
    pub total: Option<f64>,
}

/// Type of join operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    RightSemi,
    RightAnti,
}

impl JoinType {
    /// Parses a join type from its PostgreSQL label
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "inner" => Some(Self::Inner),
            "left" | "left outer" => Some(Self::Left),
            "right" | "right outer" => Some(Self::Right),
            "full" | "full outer" => Some(Self::Full),
            "semi" => Some(Self::Semi),
            "anti" => Some(Self::Anti),
            "right semi" => Some(Self::RightSemi),
            "right anti" => Some(Self::RightAnti),
            _ => None,
        }
    }
}

/// Node types the detectors dispatch on
///
/// Labels are matched in their canonical JSON spelling; the TEXT parser
/// canonicalizes before building nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    SeqScan,
    IndexScan,
    BitmapHeapScan,
    CteScan,
    WorkTableScan,
    NestedLoop,
    Sort,
    Limit,
    Other,
}

impl NodeType {
    pub fn from_label(label: &str) -> Self {
        match label {
            "Seq Scan" => Self::SeqScan,
            "Index Scan" => Self::IndexScan,
            "Bitmap Heap Scan" => Self::BitmapHeapScan,
            "CTE Scan" => Self::CteScan,
            "WorkTable Scan" => Self::WorkTableScan,
            "Nested Loop" => Self::NestedLoop,
            "Sort" => Self::Sort,
            "Limit" => Self::Limit,
            _ => Self::Other,
        }
    }
}

/// Iterator for traversing plan nodes depth-first
pub struct PlanNodeIterator<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> PlanNodeIterator<'a> {
    pub fn new(root: &'a PlanNode) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for PlanNodeIterator<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        // Push children in reverse order so we visit them in order
        for child in node.children.iter().rev() {
            self.stack.push(child);
        }
        Some(node)
    }
}
