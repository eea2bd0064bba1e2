//! Shape resolution for JSON plan payloads
//!
//! Plans arrive wrapped in many ways: a bare node, `{"Plan": ...}`,
//! `[{"Plan": ...}]`, `{"content": {"Plan": ...}}` or `{"plan": ...}`.
//! Each wrapper is recognized by one matcher; the matchers are tried in
//! order and the first that applies either yields the tree or unwraps one
//! level and starts over.

use serde_json::Value;

/// Outcome of a single matcher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape<'a> {
    /// The plan tree has been found
    Tree(&'a Value),
    /// Peel one wrapper level and resolve again
    Unwrap(&'a Value),
}

type Matcher = for<'a> fn(&'a Value) -> Option<Shape<'a>>;

const MAX_UNWRAP_DEPTH: usize = 16;

fn bare_node(value: &Value) -> Option<Shape<'_>> {
    (value.get("Node Type").is_some() || value.get("nodeType").is_some())
        .then_some(Shape::Tree(value))
}

fn content_plan(value: &Value) -> Option<Shape<'_>> {
    value.get("content")?.get("Plan").map(Shape::Tree)
}

fn plan_key(value: &Value) -> Option<Shape<'_>> {
    value.get("Plan").map(Shape::Tree)
}

fn lowercase_plan_key(value: &Value) -> Option<Shape<'_>> {
    value.get("plan").map(Shape::Unwrap)
}

fn first_element(value: &Value) -> Option<Shape<'_>> {
    value.as_array()?.first().map(Shape::Unwrap)
}

fn itself(value: &Value) -> Option<Shape<'_>> {
    Some(Shape::Tree(value))
}

const MATCHERS: &[Matcher] = &[
    bare_node,
    content_plan,
    plan_key,
    lowercase_plan_key,
    first_element,
    itself,
];

/// Resolves the plan tree inside a JSON payload.
///
/// Returns `None` only when the wrappers nest deeper than the unwrap limit.
/// The result is not guaranteed to be an object; callers check.
pub fn resolve_tree(value: &Value) -> Option<&Value> {
    let mut current = value;
    for _ in 0..MAX_UNWRAP_DEPTH {
        let shape = MATCHERS.iter().find_map(|matcher| matcher(current))?;
        match shape {
            Shape::Tree(tree) => return Some(tree),
            Shape::Unwrap(inner) => current = inner,
        }
    }
    None
}

/// Returns true if the value is an object carrying a node type
pub fn has_node_type(value: &Value) -> bool {
    value
        .get("Node Type")
        .or_else(|| value.get("nodeType"))
        .and_then(Value::as_str)
        .is_some_and(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests;
