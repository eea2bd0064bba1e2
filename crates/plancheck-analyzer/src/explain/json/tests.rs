//! Tests for the EXPLAIN JSON parser

use super::*;
use indoc::indoc;
use pretty_assertions::assert_eq;
use serde_json::json;

const SIMPLE_PLAN: &str = indoc! {r#"
    [
      {
        "Plan": {
          "Node Type": "Hash Join",
          "Join Type": "Inner",
          "Startup Cost": 1.23,
          "Total Cost": 45.67,
          "Plan Rows": 100,
          "Plan Width": 64,
          "Actual Startup Time": 0.5,
          "Actual Total Time": 12.5,
          "Actual Rows": 98,
          "Actual Loops": 1,
          "Hash Cond": "(o.user_id = u.id)",
          "Plans": [
            {
              "Node Type": "Seq Scan",
              "Parent Relationship": "Outer",
              "Relation Name": "orders",
              "Schema": "public",
              "Alias": "o",
              "Plan Rows": 1000,
              "Actual Rows": 1000,
              "Actual Loops": 1,
              "Shared Hit Blocks": 12,
              "Shared Read Blocks": 3
            },
            {
              "Node Type": "Hash",
              "Parent Relationship": "Inner",
              "Hash Buckets": 1024,
              "Hash Batches": 4,
              "Peak Memory Usage": 2048,
              "Plans": [
                {"Node Type": "Seq Scan", "Relation Name": "users", "Alias": "u"}
              ]
            }
          ]
        },
        "Planning Time": 0.321,
        "Triggers": [],
        "Execution Time": 13.1
      }
    ]
"#};

mod extraction_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_balanced_slice_ignores_brackets_in_strings() {
        let text = r#"noise {"Filter": "(name = '}')", "a": [1, 2]} trailing ]"#;
        assert_eq!(
            balanced_json_slice(text),
            Some(r#"{"Filter": "(name = '}')", "a": [1, 2]}"#)
        );
    }

    #[test]
    fn test_balanced_slice_falls_back_to_last_closer() {
        assert_eq!(balanced_json_slice("[{\"a\": 1}"), Some("[{\"a\": 1}"));
        assert_eq!(balanced_json_slice("plain text"), None);
    }

    #[test]
    fn test_extract_psql_aligned_output() {
        let raw = "                 QUERY PLAN\n\
                   --------------------------------------------\n \
                   [                                          +\n   \
                   {                                          +\n     \
                   \"Plan\": {\"Node Type\": \"Result\"}      +\n   \
                   }                                          +\n \
                   ]\n\
                   (1 row)";
        let value = extract_json_value(raw).unwrap();
        assert_eq!(value, json!([{"Plan": {"Node Type": "Result"}}]));
    }

    #[test]
    fn test_extract_pgadmin_doubled_quotes() {
        let raw = r#""[{""Plan"": {""Node Type"": ""Seq Scan"", ""Relation Name"": ""users""}}]""#;
        let value = extract_json_value(raw).unwrap();
        assert_eq!(value[0]["Plan"]["Relation Name"], json!("users"));
    }

    #[test]
    fn test_extract_keeps_legitimate_empty_strings() {
        let raw = r#"{"Plan": {"Node Type": "Result", "Alias": ""}}"#;
        let value = extract_json_value(raw).unwrap();
        assert_eq!(value["Plan"]["Alias"], json!(""));
    }

    #[test]
    fn test_extract_errors() {
        assert!(matches!(
            extract_json_value("Seq Scan on users"),
            Err(JsonExtractError::NotFound)
        ));
        assert!(matches!(
            extract_json_value("{not json}"),
            Err(JsonExtractError::Invalid(_))
        ));
    }
}

mod conversion_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_plan() {
        let plan = parse_json_plan(SIMPLE_PLAN).unwrap();
        let root = &plan.tree;

        assert_eq!(root.node_type, "Hash Join");
        assert_eq!(root.join_type, Some(JoinType::Inner));
        assert_eq!(root.cost, Some(NodeCost::new(1.23, 45.67)));
        assert_eq!(root.plan_width, Some(64));
        assert_eq!(root.actual_rows, Some(98.0));
        assert_eq!(root.hash_cond.as_deref(), Some("(o.user_id = u.id)"));
        assert_eq!(root.children.len(), 2);
        assert_eq!(plan.timings, Timings::new(Some(0.321), Some(13.1)));
        assert!(plan.additional_plans.is_empty());

        let orders = &root.children[0];
        assert_eq!(orders.relation_name.as_deref(), Some("orders"));
        assert_eq!(orders.schema.as_deref(), Some("public"));
        assert_eq!(orders.alias.as_deref(), Some("o"));
        assert_eq!(orders.parent_relationship.as_deref(), Some("Outer"));
        assert_eq!(orders.buffers.shared_accessed(), 15);

        let hash = &root.children[1];
        assert_eq!(hash.hash_buckets, Some(1024));
        assert_eq!(hash.hash_batches, Some(4));
        assert_eq!(hash.peak_memory_usage_kb, Some(2048));
        assert_eq!(hash.children[0].relation_name.as_deref(), Some("users"));
    }

    #[test]
    fn test_unknown_properties_land_in_extra() {
        let node = plan_node_from_value(&json!({
            "Node Type": "Seq Scan",
            "Async Capable": false,
            "Relation Name": "t"
        }));
        assert_eq!(node.extra.get("Async Capable"), Some(&json!(false)));
        assert!(!node.extra.contains_key("Relation Name"));
    }

    #[test]
    fn test_missing_node_type_keeps_children() {
        let node = plan_node_from_value(&json!({
            "Plans": [{"Node Type": "Seq Scan"}]
        }));
        assert!(!node.is_valid());
        assert_eq!(node.children.len(), 1);
        assert!(node.children[0].is_valid());
    }

    #[test]
    fn test_alternative_child_keys_and_aliases() {
        let node = plan_node_from_value(&json!({
            "Node Type": "Hash",
            "Batches": 8,
            "Buckets": 4096,
            "Memory Usage": 512,
            "Children": [{"Node Type": "Seq Scan"}]
        }));
        assert_eq!(node.hash_batches, Some(8));
        assert_eq!(node.hash_buckets, Some(4096));
        assert_eq!(node.peak_memory_usage_kb, Some(512));
        assert_eq!(node.children.len(), 1);

        let lower = plan_node_from_value(&json!({
            "Node Type": "Append",
            "plans": [{"Node Type": "Result"}, {"Node Type": "Result"}]
        }));
        assert_eq!(lower.children.len(), 2);
    }

    #[test]
    fn test_sort_properties() {
        let node = plan_node_from_value(&json!({
            "Node Type": "Sort",
            "Sort Key": ["created_at DESC", "id"],
            "Sort Method": "external merge",
            "Sort Space Used": 204800,
            "Sort Space Type": "Disk"
        }));
        assert_eq!(node.sort_keys, vec!["created_at DESC", "id"]);
        assert_eq!(node.sort_method.as_deref(), Some("external merge"));
        assert_eq!(node.sort_space_used_kb, Some(204800));
        assert_eq!(node.sort_space_type, Some(SortSpaceType::Disk));
    }

    #[test]
    fn test_integral_floats_accepted_as_counts() {
        let node = plan_node_from_value(&json!({"Node Type": "Seq Scan", "Actual Loops": 3.0}));
        assert_eq!(node.actual_loops, Some(3));
    }

    #[test]
    fn test_nesting_past_the_limit_becomes_a_parse_error() {
        let mut value = json!({"Node Type": "Result"});
        for _ in 0..150 {
            value = json!({"Node Type": "Materialize", "Plans": [value]});
        }

        let node = plan_node_from_value(&value);
        assert_eq!(node.node_count(), MAX_PLAN_DEPTH + 1);

        let mut deepest = &node;
        while let Some(child) = deepest.children.first() {
            deepest = child;
        }
        assert_eq!(deepest.node_type, PlanNode::PARSE_ERROR);
    }

    #[test]
    fn test_non_object_value() {
        assert!(!plan_node_from_value(&json!("Seq Scan")).is_valid());
    }
}

mod wrapper_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_root_level_triggers_and_jit_attached() {
        let raw = json!([{
            "Plan": {"Node Type": "ModifyTable", "Operation": "Insert", "Actual Total Time": 2000.0},
            "Triggers": [
                {"Trigger Name": "audit_insert", "Relation": "orders", "Time": 1500.5, "Calls": 1000}
            ],
            "JIT": {
                "Functions": 12,
                "Options": {"Inlining": true, "Optimization": false},
                "Timing": {"Generation": 1.5, "Inlining": 2.0, "Optimization": 3.0, "Emission": 4.0, "Total": 10.5}
            }
        }])
        .to_string();

        let plan = parse_json_plan(&raw).unwrap();
        let root = &plan.tree;
        assert_eq!(root.operation.as_deref(), Some("Insert"));
        assert_eq!(
            root.triggers,
            vec![TriggerTiming {
                name: "audit_insert".into(),
                total_time_ms: 1500.5,
                calls: 1000,
                relation: Some("orders".into()),
            }]
        );

        let jit = root.jit.as_ref().unwrap();
        assert_eq!(jit.functions, Some(12));
        assert_eq!(jit.options_text.as_deref(), Some("Inlining true, Optimization false"));
        assert_eq!(jit.timing.unwrap().total, Some(10.5));
    }

    #[test]
    fn test_jit_timing_with_nested_phases() {
        let jit = jit_from_value(&json!({
            "Functions": 3,
            "Options": "Inlining false, Optimization false",
            "Timing": {"Generation": {"Deform": 0.1, "Total": 0.5}, "Total": 4.25}
        }))
        .unwrap();
        let timing = jit.timing.unwrap();
        assert_eq!(timing.generation, Some(0.5));
        assert_eq!(timing.total, Some(4.25));
        assert_eq!(timing.emission, None);
        assert_eq!(jit.options_text.as_deref(), Some("Inlining false, Optimization false"));
    }

    #[test]
    fn test_multiple_plans() {
        let raw = json!([
            {"Plan": {"Node Type": "Seq Scan", "Relation Name": "a"}},
            {"Plan": {"Node Type": "Index Scan", "Relation Name": "b"}},
            {"Not": "a plan"}
        ])
        .to_string();

        let plan = parse_json_plan(&raw).unwrap();
        assert_eq!(plan.tree.relation_name.as_deref(), Some("a"));
        assert_eq!(plan.additional_plans.len(), 1);
        assert_eq!(plan.additional_plans[0].relation_name.as_deref(), Some("b"));
    }

    #[test]
    fn test_plan_timings_fallback_to_plan_object() {
        let raw = r#"{"Plan": {"Node Type": "Result", "Actual Total Time": 5.5, "Planning Time": 0.7}}"#;
        let plan = parse_json_plan(raw).unwrap();
        assert_eq!(plan.timings, Timings::new(Some(0.7), Some(5.5)));
    }

    #[test]
    fn test_declines_without_node_type() {
        assert!(matches!(
            parse_json_plan(r#"{"rows": [1, 2, 3]}"#),
            Err(JsonExtractError::NoPlanTree)
        ));
        assert!(matches!(parse_json_plan("[]"), Err(JsonExtractError::NoPlanTree)));
    }
}
