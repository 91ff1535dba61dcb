//! Tests for the property extractors

use super::*;
use crate::explain::plan::{JitInfo, PlanNode, PropValue, SortSpaceType, Worker};
use pretty_assertions::assert_eq;

// ============================================================================
// Individual extractors
// ============================================================================

#[test]
fn test_sort_line_memory_and_disk() {
    let memory = sort_line("Sort Method: quicksort  Memory: 25kB").expect("match");
    assert_eq!(memory.method, "quicksort");
    assert_eq!(memory.space_used, Some(25));
    assert_eq!(memory.space_type, SortSpaceType::Memory);

    let disk = sort_line("Sort Method: external merge  Disk: 4920kB").expect("match");
    assert_eq!(disk.method, "external merge");
    assert_eq!(disk.space_used, Some(4920));
    assert_eq!(disk.space_type, SortSpaceType::Disk);
}

#[test]
fn test_sort_line_rejects_other_dialects() {
    assert!(sort_line("Sort Key: a, b").is_none());
    assert!(sort_line("Buffers: shared hit=1").is_none());
}

#[test]
fn test_sort_key_line_splits_balanced() {
    let (kind, keys) = sort_key_line("Sort Key: a, func(b, c), d DESC").expect("match");
    assert_eq!(kind, SortKeyKind::Sort);
    assert_eq!(keys, vec!["a", "func(b, c)", "d DESC"]);

    let (kind, keys) = sort_key_line("Presorted Key: t.x").expect("match");
    assert_eq!(kind, SortKeyKind::Presorted);
    assert_eq!(keys, vec!["t.x"]);
}

#[test]
fn test_buffers_zero_initializes_touched_category() {
    let mut node = PlanNode::new("Seq Scan");
    assert!(apply_buffers(&mut node, "Buffers: shared hit=10 read=2"));

    assert_eq!(node.shared_hit_blocks, Some(10));
    assert_eq!(node.shared_read_blocks, Some(2));
    assert_eq!(node.shared_written_blocks, Some(0));
    assert_eq!(node.shared_dirtied_blocks, Some(0));
    assert_eq!(node.local_hit_blocks, None);
    assert_eq!(node.temp_read_blocks, None);
}

#[test]
fn test_buffers_multiple_groups() {
    let mut node = PlanNode::new("Sort");
    assert!(apply_buffers(
        &mut node,
        "Buffers: shared hit=5 dirtied=1, temp read=3 written=4"
    ));

    assert_eq!(node.shared_hit_blocks, Some(5));
    assert_eq!(node.shared_dirtied_blocks, Some(1));
    assert_eq!(node.shared_read_blocks, Some(0));
    assert_eq!(node.temp_read_blocks, Some(3));
    assert_eq!(node.temp_written_blocks, Some(4));
    assert_eq!(node.temp_hit_blocks, Some(0));
    assert_eq!(node.local_hit_blocks, None);
}

#[test]
fn test_wal_defaults_and_fpi() {
    let mut node = PlanNode::new("Update");
    assert!(apply_wal(&mut node, "WAL: records=5 fpi=1"));

    assert_eq!(node.wal_records, Some(5));
    assert_eq!(node.wal_fpi, Some(1));
    assert_eq!(node.wal_bytes, Some(0));
}

#[test]
fn test_io_timings_defaults() {
    let mut node = PlanNode::new("Seq Scan");
    assert!(apply_io_timings(&mut node, "I/O Timings: read=1.25"));

    assert_eq!(node.io_read_time, Some(1.25));
    assert_eq!(node.io_write_time, Some(0.0));
}

#[test]
fn test_options_parses_json_literals() {
    let options = options_line(
        "Options: Inlining false, Optimization false, Expressions true, Deforming true",
    )
    .expect("match");
    assert_eq!(options.get("Inlining"), Some(&PropValue::Bool(false)));
    assert_eq!(options.get("Expressions"), Some(&PropValue::Bool(true)));
    assert_eq!(options.len(), 4);
}

#[test]
fn test_timing_strips_ms_unit() {
    let timing =
        timing_line("Timing: Generation 0.340 ms, Inlining 0.000 ms, Total 2.414 ms").expect("match");
    assert_eq!(timing.get("Generation"), Some(&0.34));
    assert_eq!(timing.get("Inlining"), Some(&0.0));
    assert_eq!(timing.get("Total"), Some(&2.414));
}

#[test]
fn test_settings_strips_quotes_and_respects_balance() {
    let settings =
        settings_line("Settings: work_mem = '4MB', search_path = 'public, s1'").expect("match");
    assert_eq!(settings.get("work_mem"), Some(&"4MB".to_string()));
    assert_eq!(settings.get("search_path"), Some(&"public, s1".to_string()));
}

#[test]
fn test_sort_groups_structured() {
    let (kind, groups) = sort_groups_line(
        "Full-sort Groups: 312500  Sort Method: quicksort  Average Memory: 26kB  Peak Memory: 26kB",
    )
    .expect("match");
    assert_eq!(kind, SortGroupsKind::FullSort);
    assert_eq!(groups.group_count, 312500);
    assert_eq!(groups.sort_methods_used, vec!["quicksort"]);
    assert_eq!(groups.sort_space_memory.average_sort_space_used, 26);
    assert_eq!(groups.sort_space_memory.peak_sort_space_used, 26);

    let (kind, groups) = sort_groups_line(
        "Pre-sorted Groups: 4  Sort Methods: quicksort, top-N heapsort  Average Memory: 30kB  Peak Memory: 32kB",
    )
    .expect("match");
    assert_eq!(kind, SortGroupsKind::PreSorted);
    assert_eq!(groups.sort_methods_used, vec!["quicksort", "top-N heapsort"]);
}

#[test]
fn test_fallback_pair_coerces_and_title_cases() {
    assert_eq!(
        fallback_pair("execution time: 1.5 ms"),
        Some(("Execution Time".to_string(), PropValue::Number(1.5)))
    );
    assert_eq!(
        fallback_pair("total runtime: 2.0 ms"),
        Some(("Total Runtime".to_string(), PropValue::Number(2.0)))
    );
    assert_eq!(
        fallback_pair("Filter: (x > 1)"),
        Some(("Filter".to_string(), PropValue::Text("(x > 1)".to_string())))
    );
    assert_eq!(
        fallback_pair("Heap Fetches: 0"),
        Some(("Heap Fetches".to_string(), PropValue::Number(0.0)))
    );
    assert_eq!(fallback_pair("no separator here"), None);
}

// ============================================================================
// Apply chains
// ============================================================================

#[test]
fn test_apply_node_property_priority_order() {
    let mut node = PlanNode::new("Sort");
    apply_node_property(&mut node, "Sort Method: quicksort  Memory: 25kB");
    apply_node_property(&mut node, "Sort Key: t.a");
    apply_node_property(&mut node, "Rows Removed by Filter: 100");

    assert_eq!(node.sort_method, Some("quicksort".to_string()));
    assert_eq!(node.sort_key, Some(vec!["t.a".to_string()]));
    assert_eq!(
        node.extra.get("Rows Removed by Filter"),
        Some(&PropValue::Number(100.0))
    );
}

#[test]
fn test_sort_groups_reordered_falls_back() {
    // The structured extractor requires the exact phrase ordering; a
    // reordered dialect degrades to a verbatim capture.
    let mut node = PlanNode::new("Incremental Sort");
    apply_node_property(
        &mut node,
        "Full-sort Groups: 5  Peak Memory: 26kB  Average Memory: 26kB",
    );

    assert_eq!(node.full_sort_groups, None);
    assert_eq!(
        node.extra.get("Full-sort Groups"),
        Some(&PropValue::Text(
            "5  Peak Memory: 26kB  Average Memory: 26kB".to_string()
        ))
    );
}

#[test]
fn test_apply_worker_property_sort_then_raw_capture() {
    let mut worker = Worker::new(0);
    apply_worker_property(&mut worker, "Sort Method: external merge  Disk: 4400kB");
    assert_eq!(worker.sort_method, Some("external merge".to_string()));
    assert_eq!(worker.sort_space_used, Some(4400));
    assert_eq!(worker.sort_space_type, Some(SortSpaceType::Disk));

    apply_worker_property(&mut worker, "some info: raw value");
    assert_eq!(
        worker.extra.get("Some Info"),
        Some(&PropValue::Text("raw value".to_string()))
    );
}

#[test]
fn test_apply_worker_property_without_separator_is_dropped() {
    let mut worker = Worker::new(0);
    apply_worker_property(&mut worker, "quicksort");
    assert!(worker.extra.is_empty());
    assert_eq!(worker.sort_method, None);
}

#[test]
fn test_apply_jit_property() {
    let mut jit = JitInfo::default();
    apply_jit_property(&mut jit, "Options: Inlining false, Deforming true");
    apply_jit_property(&mut jit, "Timing: Generation 0.340 ms, Total 2.414 ms");
    apply_jit_property(&mut jit, "Functions: 13");

    let options = jit.options.expect("options");
    assert_eq!(options.get("Deforming"), Some(&PropValue::Bool(true)));
    let timing = jit.timing.expect("timing");
    assert_eq!(timing.get("Total"), Some(&2.414));
    assert_eq!(jit.extra.get("Functions"), Some(&PropValue::Number(13.0)));
}
