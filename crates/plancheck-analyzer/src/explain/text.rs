//! PostgreSQL EXPLAIN TEXT Parser
//!
//! Parses the default EXPLAIN output format:
//!
//! ```text
//! Hash Join  (cost=1.23..45.67 rows=100 width=64) (actual time=0.5..12.5 rows=98 loops=1)
//!   Hash Cond: (o.user_id = u.id)
//!   ->  Seq Scan on orders o  (cost=0.00..20.00 rows=1000 width=32)
//!   ->  Hash  (cost=1.00..1.00 rows=10 width=32)
//!         Buckets: 1024  Batches: 1  Memory Usage: 9kB
//!         ->  Seq Scan on users u  (cost=0.00..1.00 rows=10 width=32)
//! ```
//!
//! Node labels are canonicalised to the node types EXPLAIN (FORMAT JSON)
//! reports, so both formats produce the same tree.

use crate::explain::cleanup::{TextLine, text_lines};
use crate::explain::extras::{jit_from_lines, parse_trigger_line};
use crate::explain::plan::{
    BufferCounters, JoinType, MAX_PLAN_DEPTH, NodeCost, PlanNode, SortSpaceType,
};
use crate::explain::timing::{self, Timings};
use regex::Regex;
use std::sync::LazyLock;

/// A line that starts a plan node
static NODE_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:->\s*)?[A-Z][a-zA-Z ]+(?:\s+on\s+|\s+using\s+|\s*\()")
        .expect("valid regex")
});

static NODE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?P<label>[a-z][a-z ]*?)(?:\s+using\s+(?P<index>\S+))?(?:\s+on\s+(?P<rel>[^\s(\[]+)(?:\s+(?P<alias>[^\s(\[]+))?)?\s*(?:\(|\[|$)",
    )
    .expect("valid regex")
});

static JOIN_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<base>Hash Join|Merge Join|Nested Loop)$|^(?P<kind>Hash|Merge) (?P<qualifier>Left|Right|Full|Semi|Anti|Right Semi|Right Anti) Join$|^Nested Loop (?P<loop_qualifier>Left|Right|Full|Semi|Anti|Right Semi|Right Anti) Join$",
    )
    .expect("valid regex")
});

static SET_OP_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<hashed>Hash)?SetOp\s+(?P<command>.+)$").expect("valid regex")
});

static COST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)cost=(\d+\.?\d*)\.\.(\d+\.?\d*)\s+rows=(\d+)\s+width=(\d+)")
        .expect("valid regex")
});

static ACTUAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)actual time=([\d.]+)\.\.([\d.]+)\s+rows=([\d.]+)\s+loops=(\d+)")
        .expect("valid regex")
});

static ACTUAL_ABBREVIATED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)actual[^)]*?rows=([\d.]+)\s+loops=(\d+)").expect("valid regex")
});

static EXECUTED_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[EXECUTED\s*-\s*([\d.]+)s\]").expect("valid regex")
});

static SORT_METHOD_WITH_SPACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Sort Method:\s*(.+?)\s+(Memory|Disk):\s*(\d+)kB").expect("valid regex")
});

static HASH_BUCKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBuckets:\s*(\d+)").expect("valid regex"));

static HASH_BATCHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bBatches:\s*(\d+)").expect("valid regex"));

static MEMORY_USAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Memory Usage:\s*(\d+)kB").expect("valid regex"));

static SUBPLAN_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(SubPlan|InitPlan|CTE)\s+\S+").expect("valid regex"));

/// Section headers whose indented block is not part of any node
const SKIPPED_SECTIONS: &[&str] = &["Planning:", "JIT:"];

/// A plan recovered from TEXT output
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlan {
    pub tree: PlanNode,
    pub timings: Timings,
}

/// Returns true if the line looks like the start of a plan node
pub fn is_node_start(content: &str) -> bool {
    NODE_START.is_match(content)
}

/// Parses TEXT EXPLAIN output.
///
/// Returns `None` when no line looks like a plan node.
pub fn parse_text_plan(raw: &str) -> Option<TextPlan> {
    let lines = text_lines(raw);
    let start = lines.iter().position(|line| is_node_start(&line.content))?;

    let (mut tree, _) = TextParser { lines: &lines }.parse_node(start, 0);
    if tree.jit.is_none() {
        tree.jit = jit_from_lines(&lines);
    }

    Some(TextPlan {
        tree,
        timings: timing::scan_text(raw),
    })
}

struct TextParser<'a> {
    lines: &'a [TextLine],
}

impl TextParser<'_> {
    /// Parses the node at `index` with its properties and children.
    ///
    /// Returns the node and the index of the first line that does not belong
    /// to it.
    fn parse_node(&self, index: usize, depth: usize) -> (PlanNode, usize) {
        let is_root = depth == 0;
        let indent = self.lines[index].indent;
        let mut node = parse_node_line(&self.lines[index].content);
        let mut pending_relationship = None;
        let mut skipped_section: Option<usize> = None;
        let mut next = index + 1;

        while let Some(line) = self.lines.get(next) {
            if let Some(section_indent) = skipped_section {
                if line.indent > section_indent {
                    next += 1;
                    continue;
                }
                skipped_section = None;
            }

            if line.is_child() {
                if line.indent <= indent {
                    break;
                }
                let (mut child, after) = if depth + 1 < MAX_PLAN_DEPTH {
                    self.parse_node(next, depth + 1)
                } else {
                    (PlanNode::too_deep(), self.skip_subtree(next))
                };
                if let Some(relationship) = pending_relationship.take() {
                    child.parent_relationship = Some(relationship);
                }
                node.children.push(child);
                next = after;
                continue;
            }

            // The root also owns the trailing lines (triggers, timings)
            if !is_root && line.indent <= indent {
                break;
            }

            let content = line.content.as_str();
            if SKIPPED_SECTIONS.contains(&content) {
                skipped_section = Some(line.indent);
            } else if let Some(caps) = SUBPLAN_LABEL.captures(content) {
                pending_relationship = Some(match &caps[1] {
                    "CTE" => "InitPlan".to_string(),
                    other => other.to_string(),
                });
            } else {
                apply_property(&mut node, content);
            }
            next += 1;
        }

        (node, next)
    }

    /// Returns the index of the first line past the node at `index`
    fn skip_subtree(&self, index: usize) -> usize {
        let indent = self.lines[index].indent;
        let mut next = index + 1;
        while self.lines.get(next).is_some_and(|line| line.indent > indent) {
            next += 1;
        }
        next
    }
}

/// Parses a node line: label, relation, index and the cost/actual groups
pub fn parse_node_line(content: &str) -> PlanNode {
    let content = content.trim_start_matches("->").trim();
    let mut node = PlanNode::default();

    let (label, index, relation, alias) = match NODE_HEAD.captures(content) {
        Some(caps) => (
            caps["label"].trim().to_string(),
            caps.name("index").map(|m| m.as_str().to_string()),
            caps.name("rel").map(|m| m.as_str().to_string()),
            caps.name("alias").map(|m| m.as_str().to_string()),
        ),
        None => {
            let head = content.split('(').next().unwrap_or(content).trim();
            (head.to_string(), None, None, None)
        }
    };

    node.node_type = canonicalize_label(&label, &mut node);
    node.index_name = index.map(|i| unquote(&i));

    if let Some(relation) = relation {
        let (schema, name) = split_relation(&relation);
        match node.node_type.as_str() {
            "CTE Scan" | "WorkTable Scan" => node.cte_name = Some(name),
            "Bitmap Index Scan" => node.index_name = Some(name),
            _ => {
                node.schema = schema;
                node.relation_name = Some(name);
            }
        }
        node.alias = alias.map(|a| unquote(&a));
    }

    apply_estimates(&mut node, content);
    node
}

fn apply_estimates(node: &mut PlanNode, content: &str) {
    if let Some(caps) = COST.captures(content) {
        if let (Ok(startup), Ok(total)) = (caps[1].parse(), caps[2].parse()) {
            node.cost = Some(NodeCost::new(startup, total));
        }
        node.plan_rows = caps[3].parse().ok();
        node.plan_width = caps[4].parse().ok();
    }

    if let Some(caps) = ACTUAL.captures(content) {
        node.actual_startup_time_ms = caps[1].parse().ok();
        node.actual_total_time_ms = caps[2].parse().ok();
        node.actual_rows = caps[3].parse().ok();
        node.actual_loops = caps[4].parse().ok();
    } else {
        if let Some(caps) = ACTUAL_ABBREVIATED.captures(content) {
            node.actual_rows = caps[1].parse().ok();
            node.actual_loops = caps[2].parse().ok();
        }
        if let Some(caps) = EXECUTED_ANNOTATION.captures(content) {
            node.actual_total_time_ms = caps[1].parse::<f64>().ok().map(|s| s * 1000.0);
        }
    }

    if content.contains("never executed") {
        node.actual_rows = Some(0.0);
        node.actual_loops = Some(0);
    }
}

fn strip_word_prefix<'a>(label: &'a str, word: &str) -> Option<&'a str> {
    label
        .strip_prefix(word)
        .and_then(|rest| rest.strip_prefix(' '))
        .map(str::trim_start)
}

/// Maps a TEXT node label to its JSON node type, recording the qualifiers
/// the label carried on the node
fn canonicalize_label(label: &str, node: &mut PlanNode) -> String {
    let mut label = label.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(rest) = strip_word_prefix(&label, "Parallel") {
        node.parallel_aware = Some(true);
        label = rest.to_string();
    }
    for mode in ["Partial", "Finalize"] {
        if let Some(rest) = strip_word_prefix(&label, mode) {
            node.partial_mode = Some(mode.to_string());
            label = rest.to_string();
        }
    }
    if let Some(rest) = label.strip_suffix(" Backward") {
        node.scan_direction = Some("Backward".to_string());
        label = rest.to_string();
    }

    let (canonical, strategy) = match label.as_str() {
        "Aggregate" => ("Aggregate", Some("Plain")),
        "HashAggregate" => ("Aggregate", Some("Hashed")),
        "GroupAggregate" => ("Aggregate", Some("Sorted")),
        "MixedAggregate" => ("Aggregate", Some("Mixed")),
        "Insert" | "Update" | "Delete" | "Merge" => {
            node.operation = Some(label.clone());
            ("ModifyTable", None)
        }
        _ => return canonicalize_compound_label(&label, node),
    };

    node.strategy = strategy.map(String::from);
    canonical.to_string()
}

fn canonicalize_compound_label(label: &str, node: &mut PlanNode) -> String {
    if let Some(caps) = JOIN_LABEL.captures(label) {
        if let Some(base) = caps.name("base") {
            node.join_type = Some(JoinType::Inner);
            return base.as_str().to_string();
        }
        if let (Some(kind), Some(qualifier)) = (caps.name("kind"), caps.name("qualifier")) {
            node.join_type = JoinType::parse(qualifier.as_str());
            return format!("{} Join", kind.as_str());
        }
        if let Some(qualifier) = caps.name("loop_qualifier") {
            node.join_type = JoinType::parse(qualifier.as_str());
            return "Nested Loop".to_string();
        }
    }

    if let Some(caps) = SET_OP_LABEL.captures(label) {
        let strategy = if caps.name("hashed").is_some() {
            "Hashed"
        } else {
            "Sorted"
        };
        node.strategy = Some(strategy.to_string());
        node.extra.insert(
            "Command".to_string(),
            serde_json::Value::String(caps["command"].to_string()),
        );
        return "SetOp".to_string();
    }

    label.to_string()
}

fn unquote(name: &str) -> String {
    name.trim_matches('"').to_string()
}

/// Splits `schema.relation` into its parts
fn split_relation(relation: &str) -> (Option<String>, String) {
    match relation.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => {
            (Some(unquote(schema)), unquote(name))
        }
        _ => (None, unquote(relation)),
    }
}

fn leading_u64(value: &str) -> Option<u64> {
    let digits: String = value.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn capture_u64(pattern: &Regex, content: &str) -> Option<u64> {
    pattern.captures(content)?.get(1)?.as_str().parse().ok()
}

/// Splits a comma-separated list, ignoring commas inside parentheses
fn split_list(value: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();

    for c in value.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

fn parse_buffers(buffers: &mut BufferCounters, value: &str) {
    for segment in value.split(',') {
        let mut words = segment.split_whitespace();
        let Some(scope) = words.next() else {
            continue;
        };
        let scope = scope.to_ascii_lowercase();

        for pair in words {
            let Some((counter, count)) = pair.split_once('=') else {
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                continue;
            };
            match (scope.as_str(), counter.to_ascii_lowercase().as_str()) {
                ("shared", "hit") => buffers.shared_hit = Some(count),
                ("shared", "read") => buffers.shared_read = Some(count),
                ("shared", "dirtied") => buffers.shared_dirtied = Some(count),
                ("shared", "written") => buffers.shared_written = Some(count),
                ("temp", "read") => buffers.temp_read = Some(count),
                ("temp", "written") => buffers.temp_written = Some(count),
                _ => {}
            }
        }
    }
}

fn apply_sort_method(node: &mut PlanNode, content: &str, value: &str) {
    if let Some(caps) = SORT_METHOD_WITH_SPACE.captures(content) {
        node.sort_method = Some(caps[1].trim().to_string());
        node.sort_space_type = SortSpaceType::parse(&caps[2]);
        node.sort_space_used_kb = caps[3].parse().ok();
    } else {
        node.sort_method = Some(value.to_string());
    }
}

/// Applies one property line to the node it belongs to
fn apply_property(node: &mut PlanNode, content: &str) {
    if let Some(trigger) = parse_trigger_line(content) {
        node.triggers.push(trigger);
        return;
    }

    let Some((key, value)) = content.split_once(':') else {
        return;
    };
    let value = value.trim();

    match key.trim().to_ascii_lowercase().as_str() {
        "filter" => node.filter = Some(value.to_string()),
        "rows removed by filter" => node.rows_removed_by_filter = leading_u64(value),
        "rows removed by index recheck" => {
            node.rows_removed_by_index_recheck = leading_u64(value)
        }
        "rows removed by join filter" => node.rows_removed_by_join_filter = leading_u64(value),
        "sort key" => node.sort_keys = split_list(value),
        "sort method" => apply_sort_method(node, content, value),
        "buckets" | "batches" | "memory usage" => {
            node.hash_buckets = capture_u64(&HASH_BUCKETS, content).or(node.hash_buckets);
            node.hash_batches = capture_u64(&HASH_BATCHES, content).or(node.hash_batches);
            node.peak_memory_usage_kb =
                capture_u64(&MEMORY_USAGE, content).or(node.peak_memory_usage_kb);
        }
        "heap fetches" => node.heap_fetches = leading_u64(value),
        "workers planned" => node.workers_planned = leading_u64(value),
        "workers launched" => node.workers_launched = leading_u64(value),
        "buffers" => parse_buffers(&mut node.buffers, value),
        "index cond" => node.index_cond = Some(value.to_string()),
        "recheck cond" => node.recheck_cond = Some(value.to_string()),
        "join filter" => node.join_filter = Some(value.to_string()),
        "hash cond" => node.hash_cond = Some(value.to_string()),
        "merge cond" => node.merge_cond = Some(value.to_string()),
        "group key" => node.group_keys = split_list(value),
        "output" => node.output = split_list(value),
        _ => {}
    }
}

#[cfg(test)]
mod tests;
