//! Tests for the EXPLAIN TEXT parser

use super::*;
use crate::explain::plan::NodeType;
use indoc::indoc;
use pretty_assertions::assert_eq;

const HASH_JOIN_PLAN: &str = indoc! {"
    Hash Join  (cost=1.23..45.67 rows=100 width=64) (actual time=0.500..12.500 rows=98 loops=1)
      Hash Cond: (o.user_id = u.id)
      Buffers: shared hit=120 read=30, temp read=5 written=7
      ->  Seq Scan on public.orders o  (cost=0.00..20.00 rows=1000 width=32) (actual time=0.010..3.000 rows=1000 loops=1)
            Filter: (status = 'open'::text)
            Rows Removed by Filter: 250
      ->  Hash  (cost=1.00..1.00 rows=10 width=32) (actual time=0.200..0.200 rows=10 loops=1)
            Buckets: 1024  Batches: 4  Memory Usage: 9kB
            ->  Seq Scan on users u  (cost=0.00..1.00 rows=10 width=32) (actual time=0.005..0.010 rows=10 loops=1)
    Planning Time: 0.321 ms
    Execution Time: 13.100 ms
"};

mod node_line_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_seq_scan_line() {
        let node = parse_node_line(
            "Seq Scan on users (cost=0.00..14.40 rows=440 width=32) (actual time=0.011..0.012 rows=1 loops=1)",
        );
        assert_eq!(node.node_type, "Seq Scan");
        assert_eq!(node.relation_name.as_deref(), Some("users"));
        assert_eq!(node.alias, None);
        assert_eq!(node.cost, Some(NodeCost::new(0.0, 14.4)));
        assert_eq!(node.plan_rows, Some(440.0));
        assert_eq!(node.plan_width, Some(32));
        assert_eq!(node.actual_startup_time_ms, Some(0.011));
        assert_eq!(node.actual_total_time_ms, Some(0.012));
        assert_eq!(node.actual_rows, Some(1.0));
        assert_eq!(node.actual_loops, Some(1));
    }

    #[test]
    fn test_index_scan_with_schema_and_alias() {
        let node = parse_node_line(
            "->  Index Scan Backward using orders_created_idx on public.orders o  (cost=0.42..8.44 rows=1 width=36)",
        );
        assert_eq!(node.kind(), NodeType::IndexScan);
        assert_eq!(node.scan_direction.as_deref(), Some("Backward"));
        assert_eq!(node.index_name.as_deref(), Some("orders_created_idx"));
        assert_eq!(node.schema.as_deref(), Some("public"));
        assert_eq!(node.relation_name.as_deref(), Some("orders"));
        assert_eq!(node.alias.as_deref(), Some("o"));
    }

    #[test]
    fn test_bitmap_index_scan_names_the_index() {
        let node = parse_node_line("->  Bitmap Index Scan on orders_status_idx  (cost=0.00..4.50 rows=50 width=0)");
        assert_eq!(node.index_name.as_deref(), Some("orders_status_idx"));
        assert_eq!(node.relation_name, None);
    }

    #[test]
    fn test_label_canonicalisation() {
        let parallel = parse_node_line("->  Parallel Seq Scan on events  (cost=0.00..1.00 rows=1 width=4)");
        assert_eq!(parallel.node_type, "Seq Scan");
        assert_eq!(parallel.parallel_aware, Some(true));

        let partial = parse_node_line("->  Partial HashAggregate  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(partial.node_type, "Aggregate");
        assert_eq!(partial.partial_mode.as_deref(), Some("Partial"));
        assert_eq!(partial.strategy.as_deref(), Some("Hashed"));

        let finalize = parse_node_line("Finalize GroupAggregate  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(finalize.partial_mode.as_deref(), Some("Finalize"));
        assert_eq!(finalize.strategy.as_deref(), Some("Sorted"));

        let left = parse_node_line("Hash Left Join  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(left.node_type, "Hash Join");
        assert_eq!(left.join_type, Some(JoinType::Left));

        let anti = parse_node_line("Nested Loop Anti Join  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(anti.node_type, "Nested Loop");
        assert_eq!(anti.join_type, Some(JoinType::Anti));

        let right_semi = parse_node_line("Hash Right Semi Join  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(right_semi.join_type, Some(JoinType::RightSemi));

        let inner = parse_node_line("Merge Join  (cost=1.00..2.00 rows=10 width=12)");
        assert_eq!(inner.join_type, Some(JoinType::Inner));

        let update = parse_node_line("Update on public.accounts a  (cost=0.00..10.00 rows=0 width=0)");
        assert_eq!(update.node_type, "ModifyTable");
        assert_eq!(update.operation.as_deref(), Some("Update"));
        assert_eq!(update.relation_name.as_deref(), Some("accounts"));

        let set_op = parse_node_line("HashSetOp Except  (cost=0.00..10.00 rows=5 width=4)");
        assert_eq!(set_op.node_type, "SetOp");
        assert_eq!(set_op.strategy.as_deref(), Some("Hashed"));
    }

    #[test]
    fn test_cte_and_worktable_scans() {
        let cte = parse_node_line("->  CTE Scan on recent r  (cost=0.00..20.00 rows=1000 width=8)");
        assert_eq!(cte.kind(), NodeType::CteScan);
        assert_eq!(cte.cte_name.as_deref(), Some("recent"));
        assert_eq!(cte.relation_name, None);
        assert_eq!(cte.alias.as_deref(), Some("r"));

        let work = parse_node_line("->  WorkTable Scan on tree t  (actual time=0.001..0.002 rows=1 loops=20000)");
        assert_eq!(work.cte_name.as_deref(), Some("tree"));
        assert_eq!(work.actual_loops, Some(20000));
    }

    #[test]
    fn test_abbreviated_actuals() {
        let timing_off = parse_node_line("Seq Scan on t  (cost=0.00..1.00 rows=1 width=4) (actual rows=2.50 loops=4)");
        assert_eq!(timing_off.actual_rows, Some(2.5));
        assert_eq!(timing_off.actual_loops, Some(4));
        assert_eq!(timing_off.actual_total_time_ms, None);

        let annotated = parse_node_line("Seq Scan on t [EXECUTED - 8.4s] (actual time... rows=500 loops=1)");
        assert_eq!(annotated.actual_rows, Some(500.0));
        assert_eq!(annotated.actual_total_time_ms, Some(8400.0));
    }

    #[test]
    fn test_never_executed() {
        let node = parse_node_line("->  Index Scan using t_pkey on t  (cost=0.29..8.30 rows=1 width=4) (never executed)");
        assert_eq!(node.actual_rows, Some(0.0));
        assert_eq!(node.actual_loops, Some(0));
    }

    #[test]
    fn test_costs_off() {
        let node = parse_node_line("Seq Scan on users u");
        assert_eq!(node.node_type, "Seq Scan");
        assert_eq!(node.alias.as_deref(), Some("u"));
        assert_eq!(node.cost, None);
    }
}

mod tree_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_hash_join_tree() {
        let plan = parse_text_plan(HASH_JOIN_PLAN).unwrap();
        let root = &plan.tree;

        assert_eq!(root.node_type, "Hash Join");
        assert_eq!(root.hash_cond.as_deref(), Some("(o.user_id = u.id)"));
        assert_eq!(root.buffers.shared_hit, Some(120));
        assert_eq!(root.buffers.shared_read, Some(30));
        assert_eq!(root.buffers.temp_read, Some(5));
        assert_eq!(root.buffers.temp_written, Some(7));
        assert_eq!(root.children.len(), 2);
        assert_eq!(plan.timings, Timings::new(Some(0.321), Some(13.1)));

        let orders = &root.children[0];
        assert_eq!(orders.relation_name.as_deref(), Some("orders"));
        assert_eq!(orders.filter.as_deref(), Some("(status = 'open'::text)"));
        assert_eq!(orders.rows_removed_by_filter, Some(250));
        assert!(orders.children.is_empty());

        let hash = &root.children[1];
        assert_eq!(hash.node_type, "Hash");
        assert_eq!(hash.hash_buckets, Some(1024));
        assert_eq!(hash.hash_batches, Some(4));
        assert_eq!(hash.peak_memory_usage_kb, Some(9));
        assert_eq!(hash.children.len(), 1);
        assert_eq!(hash.children[0].relation_name.as_deref(), Some("users"));
    }

    #[test]
    fn test_siblings_are_not_nested() {
        let raw = indoc! {"
            Append  (cost=0.00..3.00 rows=3 width=4)
              ->  Seq Scan on a  (cost=0.00..1.00 rows=1 width=4)
              ->  Seq Scan on b  (cost=0.00..1.00 rows=1 width=4)
              ->  Seq Scan on c  (cost=0.00..1.00 rows=1 width=4)
        "};
        let tree = parse_text_plan(raw).unwrap().tree;
        let relations: Vec<_> = tree
            .children
            .iter()
            .map(|c| c.relation_name.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(relations, vec!["a", "b", "c"]);
        assert!(tree.children.iter().all(|c| c.children.is_empty()));
    }

    #[test]
    fn test_sort_properties() {
        let raw = indoc! {"
            Sort  (cost=100.00..110.00 rows=4000 width=16) (actual time=900.000..1000.000 rows=4000000 loops=1)
              Sort Key: created_at DESC, COALESCE(priority, 0)
              Sort Method: external merge  Disk: 204800kB
              ->  Seq Scan on events  (cost=0.00..50.00 rows=4000 width=16)
        "};
        let tree = parse_text_plan(raw).unwrap().tree;
        assert_eq!(tree.sort_keys, vec!["created_at DESC", "COALESCE(priority, 0)"]);
        assert_eq!(tree.sort_method.as_deref(), Some("external merge"));
        assert_eq!(tree.sort_space_used_kb, Some(204800));
        assert_eq!(tree.sort_space_type, Some(SortSpaceType::Disk));

        let memory = parse_text_plan("Sort  (cost=1.00..2.00 rows=1 width=4)\n  Sort Method: quicksort  Memory: 25kB")
            .unwrap()
            .tree;
        assert_eq!(memory.sort_method.as_deref(), Some("quicksort"));
        assert_eq!(memory.sort_space_type, Some(SortSpaceType::Memory));
        assert_eq!(memory.sort_space_used_kb, Some(25));
    }

    #[test]
    fn test_trailing_triggers_and_jit_attach_to_root() {
        let raw = indoc! {"
            Insert on orders  (cost=0.00..15.00 rows=0 width=0) (actual time=2400.000..2400.000 rows=0 loops=1)
              ->  Seq Scan on staging  (cost=0.00..15.00 rows=1000 width=48) (actual time=0.010..1.200 rows=1000 loops=1)
            Planning:
              Buffers: shared hit=99
            Planning Time: 0.120 ms
            Triggers:
            Trigger audit_orders on orders: time=1520.120 calls=1000
            JIT:
              Functions: 4
              Timing: Generation 1.000 ms, Inlining 0.000 ms, Optimization 2.000 ms, Emission 3.000 ms, Total 6.000 ms
            Execution Time: 2405.000 ms
        "};
        let plan = parse_text_plan(raw).unwrap();
        let root = &plan.tree;

        assert_eq!(root.node_type, "ModifyTable");
        assert_eq!(root.operation.as_deref(), Some("Insert"));
        assert_eq!(root.children.len(), 1);
        assert!(root.children[0].triggers.is_empty());
        assert_eq!(root.triggers.len(), 1);
        assert_eq!(root.triggers[0].relation.as_deref(), Some("orders"));
        assert!(root.buffers.is_empty());
        assert_eq!(root.jit.as_ref().and_then(|j| j.functions), Some(4));
        assert_eq!(plan.timings, Timings::new(Some(0.12), Some(2405.0)));
    }

    #[test]
    fn test_subplan_relationship() {
        let raw = indoc! {"
            Seq Scan on orders o  (cost=0.00..100.00 rows=10 width=8)
              Filter: (SubPlan 1)
              SubPlan 1
                ->  Index Scan using users_pkey on users u  (cost=0.29..8.30 rows=1 width=4)
                      Index Cond: (id = o.user_id)
        "};
        let tree = parse_text_plan(raw).unwrap().tree;
        assert_eq!(tree.filter.as_deref(), Some("(SubPlan 1)"));
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].parent_relationship.as_deref(), Some("SubPlan"));
        assert_eq!(tree.children[0].index_cond.as_deref(), Some("(id = o.user_id)"));
    }

    #[test]
    fn test_pgadmin_quoted_lines() {
        let raw = "\"QUERY PLAN\"\n\
                   \"Gather  (cost=1000.00..2000.00 rows=10 width=4) (actual time=5.000..50.000 rows=10 loops=1)\"\n\
                   \"  Workers Planned: 4\"\n\
                   \"  Workers Launched: 0\"\n\
                   \"  ->  Parallel Seq Scan on events  (cost=0.00..900.00 rows=4 width=4)\"";
        let tree = parse_text_plan(raw).unwrap().tree;
        assert_eq!(tree.node_type, "Gather");
        assert_eq!(tree.workers_planned, Some(4));
        assert_eq!(tree.workers_launched, Some(0));
        assert_eq!(tree.children[0].node_type, "Seq Scan");
    }

    #[test]
    fn test_leading_noise_is_skipped() {
        let raw = "Here is my plan:\n\nLimit  (cost=0.00..1.00 rows=1 width=4)\n  ->  Seq Scan on t  (cost=0.00..1.00 rows=1 width=4)";
        let tree = parse_text_plan(raw).unwrap().tree;
        assert_eq!(tree.node_type, "Limit");
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn test_not_a_plan() {
        assert_eq!(parse_text_plan("hello world"), None);
        assert_eq!(parse_text_plan("Planning Time: 1.0 ms"), None);
    }

    #[test]
    fn test_nesting_past_the_limit_becomes_a_parse_error() {
        let mut raw = String::from("Materialize  (cost=0.00..1.00 rows=1 width=4)\n");
        for level in 1..800 {
            raw.push_str(&format!(
                "{}->  Materialize  (cost=0.00..1.00 rows=1 width=4)\n",
                " ".repeat(2 * level)
            ));
            raw.push_str(&format!("{}Output: x\n", " ".repeat(2 * level + 6)));
        }
        raw.push_str("Execution Time: 1.500 ms\n");

        let plan = parse_text_plan(&raw).unwrap();
        assert_eq!(plan.tree.node_count(), MAX_PLAN_DEPTH + 1);
        assert_eq!(plan.timings.execution_ms, Some(1.5));

        let mut deepest = &plan.tree;
        while let Some(child) = deepest.children.first() {
            deepest = child;
        }
        assert_eq!(deepest.node_type, PlanNode::PARSE_ERROR);
        assert!(deepest.children.is_empty());
    }

    #[test]
    fn test_split_list_respects_parentheses() {
        assert_eq!(
            split_list("a, f(b, c), d"),
            vec!["a".to_string(), "f(b, c)".to_string(), "d".to_string()]
        );
    }
}
