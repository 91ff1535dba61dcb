//! Tests for line classification and the node factory

use super::*;
use crate::explain::plan::{JoinKind, ParentRelationship, PlanNode};
use pretty_assertions::assert_eq;

fn node(line: &str) -> PlanNode {
    parse_node_line(line).expect("operator line")
}

// ============================================================================
// Node factory: operator decomposition
// ============================================================================

#[test]
fn test_seq_scan_with_relation() {
    let node = node("Seq Scan on foo  (cost=0.00..1.00 rows=5 width=4) (actual time=0.01..0.02 rows=5 loops=1)");
    assert_eq!(node.node_type, "Seq Scan");
    assert_eq!(node.relation, Some("foo".to_string()));
    assert_eq!(node.startup_cost, Some(0.0));
    assert_eq!(node.total_cost, Some(1.0));
    assert_eq!(node.plan_rows, Some(5));
    assert_eq!(node.plan_width, Some(4));
    assert_eq!(node.actual_startup_time, Some(0.01));
    assert_eq!(node.actual_total_time, Some(0.02));
    assert_eq!(node.actual_rows, Some(5));
    assert_eq!(node.actual_loops, Some(1));
}

#[test]
fn test_scan_with_alias() {
    let node = node("Seq Scan on orders o  (cost=0.00..50.00 rows=1000 width=36)");
    assert_eq!(node.relation, Some("orders".to_string()));
    assert_eq!(node.alias, Some("o".to_string()));
}

#[test]
fn test_parallel_prefix_is_stripped() {
    let node = node("Parallel Seq Scan on big  (cost=0.00..900.00 rows=50 width=8)");
    assert_eq!(node.node_type, "Seq Scan");
    assert!(node.parallel_aware);
    assert_eq!(node.relation, Some("big".to_string()));
}

#[test]
fn test_bitmap_scans() {
    let heap = node("Bitmap Heap Scan on orders  (cost=5.00..20.00 rows=50 width=36)");
    assert_eq!(heap.node_type, "Bitmap Heap Scan");
    assert_eq!(heap.relation, Some("orders".to_string()));

    let index = node("Bitmap Index Scan on orders_status_idx  (cost=0.00..5.00 rows=50 width=0)");
    assert_eq!(index.node_type, "Bitmap Index Scan");
    assert_eq!(index.index, Some("orders_status_idx".to_string()));
    assert_eq!(index.relation, None);
}

#[test]
fn test_index_scan_forms() {
    let scan = node("Index Scan using users_pkey on users  (cost=0.42..8.44 rows=1 width=36)");
    assert_eq!(scan.node_type, "Index Scan");
    assert_eq!(scan.index, Some("users_pkey".to_string()));
    assert_eq!(scan.relation, Some("users".to_string()));

    let backward = node("Index Only Scan Backward using i on t x  (cost=0.10..0.20 rows=1 width=4)");
    assert_eq!(backward.node_type, "Index Only Scan Backward");
    assert_eq!(backward.index, Some("i".to_string()));
    assert_eq!(backward.relation, Some("t".to_string()));
    assert_eq!(backward.alias, Some("x".to_string()));
}

#[test]
fn test_cte_function_and_subquery_scans() {
    let cte = node("CTE Scan on cte_a c  (cost=0.00..2.00 rows=1 width=4)");
    assert_eq!(cte.node_type, "CTE Scan");
    assert_eq!(cte.cte_name, Some("cte_a".to_string()));
    assert_eq!(cte.alias, Some("c".to_string()));

    let function = node("Function Scan on generate_series gs  (cost=0.00..10.00 rows=1000 width=4)");
    assert_eq!(function.node_type, "Function Scan");
    assert_eq!(function.function_name, Some("generate_series".to_string()));
    assert_eq!(function.alias, Some("gs".to_string()));

    let subquery = node("Subquery Scan on inner_query  (cost=0.00..10.00 rows=100 width=4)");
    assert_eq!(subquery.node_type, "Subquery Scan");
    assert_eq!(subquery.relation, Some("inner_query".to_string()));
}

#[test]
fn test_dml_statements_decompose_like_scans() {
    let update = node("Update on t  (cost=0.00..10.00 rows=0 width=0)");
    assert_eq!(update.node_type, "Update");
    assert_eq!(update.relation, Some("t".to_string()));
}

#[test]
fn test_join_modifier_extraction() {
    let left = node("Hash Left Join  (cost=10.00..100.00 rows=500 width=72)");
    assert_eq!(left.node_type, "Hash Join");
    assert_eq!(left.join_type, Some(JoinKind::Left));

    let full = node("Merge Full Join  (cost=10.00..100.00 rows=500 width=72)");
    assert_eq!(full.node_type, "Merge Join");
    assert_eq!(full.join_type, Some(JoinKind::Full));

    let nested = node("Nested Loop Left Join  (cost=0.00..10.00 rows=1 width=8)");
    assert_eq!(nested.node_type, "Nested Loop Join");
    assert_eq!(nested.join_type, Some(JoinKind::Left));

    let plain = node("Hash Join  (cost=10.00..100.00 rows=500 width=72)");
    assert_eq!(plain.node_type, "Hash Join");
    assert_eq!(plain.join_type, None);
}

#[test]
fn test_parallel_join_with_modifier() {
    let node = node("Parallel Hash Left Join  (cost=10.00..100.00 rows=500 width=72)");
    assert_eq!(node.node_type, "Hash Join");
    assert_eq!(node.join_type, Some(JoinKind::Left));
    assert!(node.parallel_aware);
}

// ============================================================================
// Node factory: cost/actual grammar branches
// ============================================================================

#[test]
fn test_estimate_only() {
    let node = node("Sort  (cost=10.00..15.00 rows=100 width=36)");
    assert_eq!(node.total_cost, Some(15.0));
    assert_eq!(node.actual_total_time, None);
    assert_eq!(node.actual_rows, None);
}

#[test]
fn test_actual_only() {
    let node = node("Sort (actual time=0.10..0.20 rows=10 loops=1)");
    assert_eq!(node.startup_cost, None);
    assert_eq!(node.actual_startup_time, Some(0.1));
    assert_eq!(node.actual_total_time, Some(0.2));
    assert_eq!(node.actual_rows, Some(10));
    assert_eq!(node.actual_loops, Some(1));
}

#[test]
fn test_rows_only_actuals() {
    let node = node("Seq Scan on t (cost=0.00..1.00 rows=5 width=4) (actual rows=5 loops=2)");
    assert_eq!(node.actual_startup_time, None);
    assert_eq!(node.actual_total_time, None);
    assert_eq!(node.actual_rows, Some(5));
    assert_eq!(node.actual_loops, Some(2));
}

#[test]
fn test_never_executed_forces_zeroes() {
    let node = node("Seq Scan on t  (cost=0.00..1.00 rows=5 width=4) (never executed)");
    assert_eq!(node.plan_rows, Some(5));
    assert_eq!(node.actual_rows, Some(0));
    assert_eq!(node.actual_loops, Some(0));
    assert_eq!(node.actual_total_time, Some(0.0));
    assert_eq!(node.actual_startup_time, None);
}

#[test]
fn test_arrow_prefix_is_accepted() {
    let node = node("->  Sort  (cost=10.00..15.00 rows=100 width=36)");
    assert_eq!(node.node_type, "Sort");
}

#[test]
fn test_line_without_statistics_is_not_an_operator() {
    assert!(parse_node_line("Seq Scan on foo").is_none());
    assert!(parse_node_line("Filter: (a > 1)").is_none());
}

// ============================================================================
// classify
// ============================================================================

#[test]
fn test_classify_subplan_markers() {
    match classify("SubPlan 1") {
        Line::SubPlanMarker {
            relationship,
            label,
        } => {
            assert_eq!(relationship, ParentRelationship::SubPlan);
            assert_eq!(label, "SubPlan 1");
        }
        other => panic!("unexpected classification: {other:?}"),
    }

    match classify("InitPlan 2 (returns $0)") {
        Line::SubPlanMarker {
            relationship,
            label,
        } => {
            assert_eq!(relationship, ParentRelationship::InitPlan);
            assert_eq!(label, "InitPlan 2 (returns $0)");
        }
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn test_classify_cte_marker() {
    match classify("CTE cte_a") {
        Line::CteMarker { label } => assert_eq!(label, "CTE cte_a"),
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn test_classify_worker_with_actuals() {
    match classify("Worker 0:  actual time=0.60..41.00 rows=30 loops=1") {
        Line::Worker(worker) => {
            assert_eq!(worker.number, 0);
            let actual = worker.actual.expect("timed actuals");
            assert_eq!(actual.startup_time, 0.6);
            assert_eq!(actual.total_time, 41.0);
            assert_eq!(actual.rows, 30);
            assert_eq!(actual.loops, 1);
            assert_eq!(worker.rest, "");
        }
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn test_classify_worker_with_properties() {
    match classify("Worker 1:  Sort Method: quicksort  Memory: 25kB") {
        Line::Worker(worker) => {
            assert_eq!(worker.number, 1);
            assert!(worker.actual.is_none());
            assert_eq!(worker.rest, "Sort Method: quicksort  Memory: 25kB");
        }
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn test_classify_trigger() {
    match classify("Trigger audit: time=12.50 calls=100") {
        Line::Trigger(trigger) => {
            assert_eq!(trigger.name, "audit");
            assert_eq!(trigger.time, 12.5);
            assert_eq!(trigger.calls, 100);
        }
        other => panic!("unexpected classification: {other:?}"),
    }
}

#[test]
fn test_classify_jit_marker() {
    assert!(matches!(classify("JIT:"), Line::Jit));
}

#[test]
fn test_classify_headers_and_blanks() {
    assert!(matches!(classify(""), Line::Empty));
    assert!(matches!(classify("   "), Line::Empty));
    assert!(matches!(classify("QUERY PLAN"), Line::Header));
    assert!(matches!(classify("--------"), Line::Header));
    assert!(matches!(classify("# comment"), Line::Header));
}

#[test]
fn test_classify_property_line() {
    match classify("Filter: (x > 1)") {
        Line::Property(content) => assert_eq!(content, "Filter: (x > 1)"),
        other => panic!("unexpected classification: {other:?}"),
    }
}
