//! PostgreSQL EXPLAIN JSON Parser
//!
//! Handles EXPLAIN (FORMAT JSON) output as printed by psql (with header,
//! footer and `+` continuation markers), pgAdmin exports (doubled quotes)
//! and the various wrapper shapes accepted by [`resolve_tree`].
//!
//! # Examples
//!
//! ```
//! use plancheck_analyzer::explain::json::parse_json_plan;
//!
//! let json_output = r#"[
//!   {
//!     "Plan": {
//!       "Node Type": "Seq Scan",
//!       "Relation Name": "users",
//!       "Startup Cost": 0.0,
//!       "Total Cost": 10.0,
//!       "Plan Rows": 100,
//!       "Plan Width": 36
//!     },
//!     "Planning Time": 0.08
//!   }
//! ]"#;
//!
//! let plan = parse_json_plan(json_output).unwrap();
//! assert_eq!(plan.tree.node_type, "Seq Scan");
//! assert_eq!(plan.timings.planning_ms, Some(0.08));
//! ```

use crate::explain::cleanup::strip_psql_chrome;
use crate::explain::plan::{
    BufferCounters, JitInfo, JitTiming, JoinType, MAX_PLAN_DEPTH, NodeCost, PlanNode,
    SortSpaceType, TriggerTiming,
};
use crate::explain::shape::{has_node_type, resolve_tree};
use crate::explain::timing::Timings;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur when extracting a plan from JSON text
#[derive(Debug, Error)]
pub enum JsonExtractError {
    #[error("No JSON array or object found in input")]
    NotFound,

    #[error("Invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),

    #[error("JSON does not contain a plan node")]
    NoPlanTree,
}

/// Result type for JSON plan extraction
pub type Result<T> = std::result::Result<T, JsonExtractError>;

/// A plan recovered from EXPLAIN JSON
#[derive(Debug, Clone, PartialEq)]
pub struct JsonPlan {
    pub tree: PlanNode,
    pub additional_plans: Vec<PlanNode>,
    pub timings: Timings,
}

/// Properties mapped onto named `PlanNode` fields
const KNOWN_KEYS: &[&str] = &[
    "Node Type",
    "nodeType",
    "Description",
    "Relation Name",
    "Schema",
    "Alias",
    "Index Name",
    "CTE Name",
    "Parent Relationship",
    "Join Type",
    "Strategy",
    "Operation",
    "Scan Direction",
    "Partial Mode",
    "Parallel Aware",
    "Startup Cost",
    "Total Cost",
    "Plan Rows",
    "Plan Width",
    "Actual Startup Time",
    "Actual Total Time",
    "Actual Rows",
    "Actual Loops",
    "Filter",
    "Rows Removed by Filter",
    "Sort Method",
    "Sort Space Used",
    "Sort Space Type",
    "Sort Key",
    "Hash Buckets",
    "Buckets",
    "Hash Batches",
    "Batches",
    "Peak Memory Usage",
    "Memory Usage",
    "Heap Fetches",
    "Workers Planned",
    "Workers Launched",
    "Index Cond",
    "Recheck Cond",
    "Join Filter",
    "Hash Cond",
    "Merge Cond",
    "Rows Removed by Index Recheck",
    "Rows Removed by Join Filter",
    "Shared Hit Blocks",
    "Shared Read Blocks",
    "Shared Dirtied Blocks",
    "Shared Written Blocks",
    "Temp Read Blocks",
    "Temp Written Blocks",
    "Triggers",
    "JIT",
    "Group Key",
    "Output",
    "Plans",
    "Children",
    "plans",
];

/// Finds the first balanced JSON array or object in the text.
///
/// Brackets inside string literals are ignored. When the value never
/// closes, the span up to the last closing bracket is returned instead.
fn balanced_json_slice(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = text.rfind([']', '}'])?;
    (end > start).then(|| &text[start..=end])
}

fn parse_first_value(text: &str) -> Result<Value> {
    let slice = balanced_json_slice(text).ok_or(JsonExtractError::NotFound)?;
    Ok(serde_json::from_str(slice)?)
}

/// Extracts the first JSON value from raw EXPLAIN output.
///
/// The text is tried as-is first and then once more with pgAdmin's doubled
/// quotes collapsed.
pub fn extract_json_value(raw: &str) -> Result<Value> {
    let cleaned = strip_psql_chrome(raw);
    match parse_first_value(&cleaned) {
        Ok(value) => Ok(value),
        Err(first_error) => {
            if !cleaned.contains("\"\"") {
                return Err(first_error);
            }
            parse_first_value(&cleaned.replace("\"\"", "\""))
        }
    }
}

/// Parses raw EXPLAIN JSON into a plan tree.
///
/// Fails when no JSON can be found or when the resolved tree carries no
/// node type. Every further element of a top-level array becomes an
/// additional plan.
pub fn parse_json_plan(raw: &str) -> Result<JsonPlan> {
    let document = extract_json_value(raw)?;
    let roots: Vec<&Value> = match &document {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let root = roots.first().copied().ok_or(JsonExtractError::NoPlanTree)?;
    let tree_value = resolve_tree(root)
        .filter(|value| has_node_type(value))
        .ok_or(JsonExtractError::NoPlanTree)?;

    let mut tree = plan_node_from_value(tree_value);
    attach_wrapper_extras(&mut tree, root);

    let timings = Timings {
        planning_ms: root
            .get("Planning Time")
            .and_then(Value::as_f64)
            .or_else(|| tree_value.get("Planning Time").and_then(Value::as_f64)),
        execution_ms: root
            .get("Execution Time")
            .and_then(Value::as_f64)
            .or_else(|| tree_value.get("Actual Total Time").and_then(Value::as_f64)),
    };

    let additional_plans = roots
        .iter()
        .skip(1)
        .filter_map(|wrapper| {
            let value = resolve_tree(wrapper).filter(|value| has_node_type(value))?;
            let mut node = plan_node_from_value(value);
            attach_wrapper_extras(&mut node, wrapper);
            Some(node)
        })
        .collect();

    Ok(JsonPlan {
        tree,
        additional_plans,
        timings,
    })
}

/// Attaches `Triggers` and `JIT` found next to `Plan` to the root node.
///
/// PostgreSQL's JSON format places both at the wrapper level. Values already
/// present on the node are kept.
pub fn attach_wrapper_extras(node: &mut PlanNode, wrapper: &Value) {
    if node.triggers.is_empty()
        && let Some(triggers) = wrapper.get("Triggers")
    {
        node.triggers = triggers_from_value(triggers);
    }
    if node.jit.is_none() {
        node.jit = wrapper.get("JIT").and_then(jit_from_value);
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

fn f64_field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    obj.get(key).and_then(Value::as_f64)
}

fn as_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

fn u64_field(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    obj.get(key).and_then(as_count)
}

fn u64_field_any(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| u64_field(obj, key))
}

fn string_list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|k| k.as_str().map(String::from))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Converts one JSON plan node (and its children) into a `PlanNode`.
///
/// Objects without `Node Type` become invalid nodes; their children are
/// still converted. Children below [`MAX_PLAN_DEPTH`] collapse into a
/// single parse error node.
pub fn plan_node_from_value(value: &Value) -> PlanNode {
    node_from_value(value, 0)
}

fn node_from_value(value: &Value, depth: usize) -> PlanNode {
    let Some(obj) = value.as_object() else {
        return PlanNode::default();
    };

    let node_type = str_field(obj, "Node Type")
        .or_else(|| str_field(obj, "nodeType"))
        .unwrap_or_default();
    let mut node = PlanNode::new(node_type);

    // Basic properties
    node.description = str_field(obj, "Description");
    node.relation_name = str_field(obj, "Relation Name");
    node.schema = str_field(obj, "Schema");
    node.alias = str_field(obj, "Alias");
    node.index_name = str_field(obj, "Index Name");
    node.cte_name = str_field(obj, "CTE Name");
    node.parent_relationship = str_field(obj, "Parent Relationship");
    node.join_type = obj
        .get("Join Type")
        .and_then(Value::as_str)
        .and_then(JoinType::parse);
    node.strategy = str_field(obj, "Strategy");
    node.operation = str_field(obj, "Operation");
    node.scan_direction = str_field(obj, "Scan Direction");
    node.partial_mode = str_field(obj, "Partial Mode");
    node.parallel_aware = obj.get("Parallel Aware").and_then(Value::as_bool);

    // Cost information
    if let (Some(startup), Some(total)) = (
        f64_field(obj, "Startup Cost"),
        f64_field(obj, "Total Cost"),
    ) {
        node.cost = Some(NodeCost::new(startup, total));
    }
    node.plan_rows = f64_field(obj, "Plan Rows");
    node.plan_width = u64_field(obj, "Plan Width").map(|w| w as u32);

    // Actual values from EXPLAIN ANALYZE
    node.actual_startup_time_ms = f64_field(obj, "Actual Startup Time");
    node.actual_total_time_ms = f64_field(obj, "Actual Total Time");
    node.actual_rows = f64_field(obj, "Actual Rows");
    node.actual_loops = u64_field(obj, "Actual Loops");

    // Filter information
    node.filter = str_field(obj, "Filter");
    node.rows_removed_by_filter = u64_field(obj, "Rows Removed by Filter");
    node.rows_removed_by_index_recheck = u64_field(obj, "Rows Removed by Index Recheck");
    node.rows_removed_by_join_filter = u64_field(obj, "Rows Removed by Join Filter");

    // Sort information
    node.sort_method = str_field(obj, "Sort Method");
    node.sort_space_used_kb = u64_field(obj, "Sort Space Used");
    node.sort_space_type = obj
        .get("Sort Space Type")
        .and_then(Value::as_str)
        .and_then(SortSpaceType::parse);
    node.sort_keys = string_list(obj, "Sort Key");

    // Hash information
    node.hash_buckets = u64_field_any(obj, &["Hash Buckets", "Buckets"]);
    node.hash_batches = u64_field_any(obj, &["Hash Batches", "Batches"]);
    node.peak_memory_usage_kb = u64_field_any(obj, &["Peak Memory Usage", "Memory Usage"]);

    node.heap_fetches = u64_field(obj, "Heap Fetches");
    node.workers_planned = u64_field(obj, "Workers Planned");
    node.workers_launched = u64_field(obj, "Workers Launched");

    // Conditions
    node.index_cond = str_field(obj, "Index Cond");
    node.recheck_cond = str_field(obj, "Recheck Cond");
    node.join_filter = str_field(obj, "Join Filter");
    node.hash_cond = str_field(obj, "Hash Cond");
    node.merge_cond = str_field(obj, "Merge Cond");

    node.buffers = BufferCounters {
        shared_hit: u64_field(obj, "Shared Hit Blocks"),
        shared_read: u64_field(obj, "Shared Read Blocks"),
        shared_dirtied: u64_field(obj, "Shared Dirtied Blocks"),
        shared_written: u64_field(obj, "Shared Written Blocks"),
        temp_read: u64_field(obj, "Temp Read Blocks"),
        temp_written: u64_field(obj, "Temp Written Blocks"),
    };

    if let Some(triggers) = obj.get("Triggers") {
        node.triggers = triggers_from_value(triggers);
    }
    node.jit = obj.get("JIT").and_then(jit_from_value);

    node.group_keys = string_list(obj, "Group Key");
    node.output = string_list(obj, "Output");

    // Parse child plans
    let children = obj
        .get("Plans")
        .or_else(|| obj.get("Children"))
        .or_else(|| obj.get("plans"))
        .and_then(Value::as_array);
    if let Some(children) = children.filter(|c| !c.is_empty()) {
        node.children = if depth + 1 < MAX_PLAN_DEPTH {
            children
                .iter()
                .map(|child| node_from_value(child, depth + 1))
                .collect()
        } else {
            vec![PlanNode::too_deep()]
        };
    }

    // Store any extra properties we haven't explicitly handled
    for (key, val) in obj {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            node.extra.insert(key.clone(), val.clone());
        }
    }

    node
}

/// Parses a JSON `Triggers` array
pub fn triggers_from_value(value: &Value) -> Vec<TriggerTiming> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .map(|trigger| TriggerTiming {
            name: str_field(trigger, "Trigger Name").unwrap_or_else(|| "Unknown".into()),
            total_time_ms: f64_field(trigger, "Time").unwrap_or(0.0),
            calls: u64_field(trigger, "Calls").unwrap_or(0),
            relation: str_field(trigger, "Relation"),
        })
        .collect()
}

fn jit_phase(timing: &Map<String, Value>, key: &str) -> Option<f64> {
    match timing.get(key)? {
        Value::Object(phase) => f64_field(phase, "Total"),
        other => other.as_f64(),
    }
}

fn options_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(options) => Some(
            options
                .iter()
                .map(|(name, enabled)| format!("{} {}", name, enabled))
                .collect::<Vec<_>>()
                .join(", "),
        ),
        _ => None,
    }
}

/// Parses a JSON `JIT` object
pub fn jit_from_value(value: &Value) -> Option<JitInfo> {
    let obj = value.as_object()?;
    let timing = obj.get("Timing").and_then(Value::as_object).map(|timing| JitTiming {
        generation: jit_phase(timing, "Generation"),
        inlining: jit_phase(timing, "Inlining"),
        optimization: jit_phase(timing, "Optimization"),
        emission: jit_phase(timing, "Emission"),
        total: jit_phase(timing, "Total"),
    });

    Some(JitInfo {
        functions: u64_field(obj, "Functions"),
        options_text: obj.get("Options").and_then(options_text),
        timing,
    })
}

#[cfg(test)]
mod tests;
