//! Tests for shape resolution

use super::*;
use pretty_assertions::assert_eq;
use serde_json::json;

fn node_type(value: &Value) -> Option<&str> {
    resolve_tree(value)?.get("Node Type")?.as_str()
}

#[test]
fn test_bare_node() {
    let value = json!({"Node Type": "Seq Scan", "Plan": {"Node Type": "Ignored"}});
    assert_eq!(node_type(&value), Some("Seq Scan"));
}

#[test]
fn test_standard_array_wrapper() {
    let value = json!([{"Plan": {"Node Type": "Limit"}, "Planning Time": 0.1}]);
    assert_eq!(node_type(&value), Some("Limit"));
}

#[test]
fn test_content_plan_wrapper() {
    let value = json!({"content": {"Plan": {"Node Type": "Sort"}}});
    assert_eq!(node_type(&value), Some("Sort"));
}

#[test]
fn test_lowercase_plan_unwraps_recursively() {
    let value = json!({"plan": {"Plan": {"Node Type": "Hash Join"}}});
    assert_eq!(node_type(&value), Some("Hash Join"));

    let nested = json!({"plan": [{"plan": {"Node Type": "Result"}}]});
    assert_eq!(node_type(&nested), Some("Result"));
}

#[test]
fn test_camel_case_node_type() {
    let value = json!({"nodeType": "Seq Scan"});
    assert_eq!(resolve_tree(&value), Some(&value));
}

#[test]
fn test_last_resort_returns_value_itself() {
    let value = json!({"unrelated": true});
    assert_eq!(resolve_tree(&value), Some(&value));
    assert!(!has_node_type(&value));

    let empty = json!([]);
    assert_eq!(resolve_tree(&empty), Some(&empty));
}

#[test]
fn test_depth_limit() {
    let mut value = json!({"Node Type": "Result"});
    for _ in 0..(MAX_UNWRAP_DEPTH + 1) {
        value = json!([value]);
    }
    assert_eq!(resolve_tree(&value), None);
}

#[test]
fn test_has_node_type() {
    assert!(has_node_type(&json!({"Node Type": "Seq Scan"})));
    assert!(!has_node_type(&json!({"Node Type": ""})));
    assert!(!has_node_type(&json!({"Node Type": 7})));
    assert!(!has_node_type(&json!("Seq Scan")));
}
