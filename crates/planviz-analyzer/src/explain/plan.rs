//! Plan Tree Model - Data structures for representing parsed EXPLAIN output
//!
//! This module defines the typed plan tree produced by both the text and the
//! JSON parsers. Field names serialize to the property names used by
//! `EXPLAIN (FORMAT JSON)` (`"Node Type"`, `"Startup Cost"`, `"Plans"`, ...),
//! so a parsed text plan serializes to the same shape a JSON plan arrives in,
//! and that shape deserializes back into the same model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A property value captured from a line no specialized extractor claimed.
///
/// Kept deliberately small: the text grammar only ever produces scalars,
/// string lists, and nested maps, and the JSON dialect maps onto the same
/// shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PropValue>),
    Map(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Returns the numeric value if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string value if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Join modifier attached to a join operator.
///
/// The text grammar only produces `Full`, `Left`, `Right` and `Anti`; the
/// remaining variants cover values seen in `EXPLAIN (FORMAT JSON)` documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Semi,
    Anti,
    Cross,
    #[serde(other)]
    Other,
}

impl JoinKind {
    /// Parses a join modifier token from a text-format operator string.
    pub(crate) fn from_modifier(s: &str) -> Option<Self> {
        match s {
            "Full" => Some(Self::Full),
            "Left" => Some(Self::Left),
            "Right" => Some(Self::Right),
            "Anti" => Some(Self::Anti),
            _ => None,
        }
    }
}

/// How a node relates to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParentRelationship {
    Normal,
    InitPlan,
    SubPlan,
    #[serde(other)]
    Other,
}

/// Where a sort spilled: in memory or on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortSpaceType {
    Memory,
    Disk,
}

impl SortSpaceType {
    pub(crate) fn from_label(s: &str) -> Option<Self> {
        match s {
            "Memory" => Some(Self::Memory),
            "Disk" => Some(Self::Disk),
            _ => None,
        }
    }
}

/// Memory statistics of an incremental sort group block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpaceMemory {
    #[serde(rename = "Average Sort Space Used")]
    pub average_sort_space_used: u64,
    #[serde(rename = "Peak Sort Space Used")]
    pub peak_sort_space_used: u64,
}

/// A `Full-sort Groups:` / `Pre-sorted Groups:` block of an incremental sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortGroups {
    #[serde(rename = "Group Count")]
    pub group_count: u64,
    #[serde(rename = "Sort Methods Used")]
    pub sort_methods_used: Vec<String>,
    #[serde(rename = "Sort Space Memory")]
    pub sort_space_memory: SortSpaceMemory,
}

/// JIT compilation statistics, attached at the root or to a worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JitInfo {
    /// JIT options (`Inlining`, `Optimization`, ...), values as JSON literals.
    #[serde(rename = "Options", skip_serializing_if = "Option::is_none")]
    pub options: Option<BTreeMap<String, PropValue>>,
    /// JIT timings in milliseconds (`Generation`, `Emission`, ...).
    #[serde(rename = "Timing", skip_serializing_if = "Option::is_none")]
    pub timing: Option<BTreeMap<String, f64>>,
    /// Anything else found in the JIT block (`Functions`, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, PropValue>,
}

/// A trigger statistics row reported after the plan tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "Trigger Name")]
    pub name: String,
    #[serde(rename = "Relation", skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    /// Total time spent in the trigger, in milliseconds.
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "Calls")]
    pub calls: u64,
}

/// Per-worker actual statistics for a parallel node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    #[serde(rename = "Worker Number")]
    pub number: u64,
    #[serde(rename = "Actual Startup Time", skip_serializing_if = "Option::is_none")]
    pub actual_startup_time: Option<f64>,
    #[serde(rename = "Actual Total Time", skip_serializing_if = "Option::is_none")]
    pub actual_total_time: Option<f64>,
    #[serde(rename = "Actual Rows", skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,
    #[serde(rename = "Actual Loops", skip_serializing_if = "Option::is_none")]
    pub actual_loops: Option<u64>,
    #[serde(rename = "Sort Method", skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,
    #[serde(rename = "Sort Space Used", skip_serializing_if = "Option::is_none")]
    pub sort_space_used: Option<u64>,
    #[serde(rename = "Sort Space Type", skip_serializing_if = "Option::is_none")]
    pub sort_space_type: Option<SortSpaceType>,
    #[serde(rename = "JIT", skip_serializing_if = "Option::is_none")]
    pub jit: Option<JitInfo>,
    /// Free-form worker properties, stored verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, PropValue>,
}

impl Worker {
    /// Creates a worker record with the given number and no statistics.
    pub fn new(number: u64) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }
}

/// A single operator in the plan tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    /// Normalized operator kind, e.g. "Seq Scan" or "Hash Join".
    #[serde(rename = "Node Type")]
    pub node_type: String,
    #[serde(rename = "Parallel Aware", default)]
    pub parallel_aware: bool,
    #[serde(rename = "Join Type", skip_serializing_if = "Option::is_none")]
    pub join_type: Option<JoinKind>,
    #[serde(rename = "Relation Name", skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(rename = "Index Name", skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "CTE Name", skip_serializing_if = "Option::is_none")]
    pub cte_name: Option<String>,
    #[serde(rename = "Function Name", skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(rename = "Alias", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(rename = "Parent Relationship", skip_serializing_if = "Option::is_none")]
    pub parent_relationship: Option<ParentRelationship>,
    /// Marker label of the enclosing sub-plan, e.g. "InitPlan 1 (returns $0)".
    #[serde(rename = "Subplan Name", skip_serializing_if = "Option::is_none")]
    pub subplan_name: Option<String>,

    // Planner estimates.
    #[serde(rename = "Startup Cost", skip_serializing_if = "Option::is_none")]
    pub startup_cost: Option<f64>,
    #[serde(rename = "Total Cost", skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(rename = "Plan Rows", skip_serializing_if = "Option::is_none")]
    pub plan_rows: Option<u64>,
    #[serde(rename = "Plan Width", skip_serializing_if = "Option::is_none")]
    pub plan_width: Option<u64>,

    // Actual statistics from EXPLAIN ANALYZE.
    #[serde(rename = "Actual Startup Time", skip_serializing_if = "Option::is_none")]
    pub actual_startup_time: Option<f64>,
    #[serde(rename = "Actual Total Time", skip_serializing_if = "Option::is_none")]
    pub actual_total_time: Option<f64>,
    #[serde(rename = "Actual Rows", skip_serializing_if = "Option::is_none")]
    pub actual_rows: Option<u64>,
    #[serde(rename = "Actual Loops", skip_serializing_if = "Option::is_none")]
    pub actual_loops: Option<u64>,

    // Buffer usage. Once a Buffers: line touches a category, all four
    // counters of that category are present (defaulted to zero).
    #[serde(rename = "Shared Hit Blocks", skip_serializing_if = "Option::is_none")]
    pub shared_hit_blocks: Option<u64>,
    #[serde(rename = "Shared Read Blocks", skip_serializing_if = "Option::is_none")]
    pub shared_read_blocks: Option<u64>,
    #[serde(rename = "Shared Written Blocks", skip_serializing_if = "Option::is_none")]
    pub shared_written_blocks: Option<u64>,
    #[serde(rename = "Shared Dirtied Blocks", skip_serializing_if = "Option::is_none")]
    pub shared_dirtied_blocks: Option<u64>,
    #[serde(rename = "Local Hit Blocks", skip_serializing_if = "Option::is_none")]
    pub local_hit_blocks: Option<u64>,
    #[serde(rename = "Local Read Blocks", skip_serializing_if = "Option::is_none")]
    pub local_read_blocks: Option<u64>,
    #[serde(rename = "Local Written Blocks", skip_serializing_if = "Option::is_none")]
    pub local_written_blocks: Option<u64>,
    #[serde(rename = "Local Dirtied Blocks", skip_serializing_if = "Option::is_none")]
    pub local_dirtied_blocks: Option<u64>,
    #[serde(rename = "Temp Hit Blocks", skip_serializing_if = "Option::is_none")]
    pub temp_hit_blocks: Option<u64>,
    #[serde(rename = "Temp Read Blocks", skip_serializing_if = "Option::is_none")]
    pub temp_read_blocks: Option<u64>,
    #[serde(rename = "Temp Written Blocks", skip_serializing_if = "Option::is_none")]
    pub temp_written_blocks: Option<u64>,
    #[serde(rename = "Temp Dirtied Blocks", skip_serializing_if = "Option::is_none")]
    pub temp_dirtied_blocks: Option<u64>,

    // WAL usage.
    #[serde(rename = "WAL Records", skip_serializing_if = "Option::is_none")]
    pub wal_records: Option<u64>,
    #[serde(rename = "WAL Bytes", skip_serializing_if = "Option::is_none")]
    pub wal_bytes: Option<u64>,
    #[serde(rename = "WAL FPI", skip_serializing_if = "Option::is_none")]
    pub wal_fpi: Option<u64>,

    // I/O timings in milliseconds.
    #[serde(rename = "I/O Read Time", skip_serializing_if = "Option::is_none")]
    pub io_read_time: Option<f64>,
    #[serde(rename = "I/O Write Time", skip_serializing_if = "Option::is_none")]
    pub io_write_time: Option<f64>,

    // Sort information from EXPLAIN ANALYZE.
    #[serde(rename = "Sort Method", skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,
    #[serde(rename = "Sort Space Used", skip_serializing_if = "Option::is_none")]
    pub sort_space_used: Option<u64>,
    #[serde(rename = "Sort Space Type", skip_serializing_if = "Option::is_none")]
    pub sort_space_type: Option<SortSpaceType>,
    #[serde(rename = "Sort Key", skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<Vec<String>>,
    #[serde(rename = "Presorted Key", skip_serializing_if = "Option::is_none")]
    pub presorted_key: Option<Vec<String>>,
    #[serde(rename = "Full-sort Groups", skip_serializing_if = "Option::is_none")]
    pub full_sort_groups: Option<SortGroups>,
    #[serde(rename = "Pre-sorted Groups", skip_serializing_if = "Option::is_none")]
    pub pre_sorted_groups: Option<SortGroups>,

    #[serde(rename = "Workers", skip_serializing_if = "Option::is_none")]
    pub workers: Option<Vec<Worker>>,
    #[serde(rename = "JIT", skip_serializing_if = "Option::is_none")]
    pub jit: Option<JitInfo>,

    /// Child nodes, in document order.
    #[serde(rename = "Plans", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanNode>,

    /// Anything not matched by a specialized extractor, captured verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, PropValue>,
}

impl PlanNode {
    /// Creates a plan node with the given operator kind.
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
            ..Self::default()
        }
    }

    /// Returns an iterator over this subtree, depth-first.
    pub fn iter(&self) -> PlanNodeIter<'_> {
        PlanNodeIter::new(self)
    }

    /// Returns the total number of nodes in this subtree (including self).
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|c| c.node_count()).sum::<usize>()
    }

    /// Returns the maximum depth of this subtree.
    pub fn depth(&self) -> usize {
        if self.children.is_empty() {
            1
        } else {
            1 + self.children.iter().map(|c| c.depth()).max().unwrap_or(0)
        }
    }

    /// Returns true if this is a leaf node (no children).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Top-level container for one parsed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRoot {
    #[serde(rename = "Plan")]
    pub plan: PlanNode,
    #[serde(rename = "Triggers", skip_serializing_if = "Option::is_none")]
    pub triggers: Option<Vec<Trigger>>,
    #[serde(rename = "JIT", skip_serializing_if = "Option::is_none")]
    pub jit: Option<JitInfo>,
    /// Raw query text, accumulated across lines when the source carried it.
    #[serde(rename = "Query Text", skip_serializing_if = "Option::is_none")]
    pub query_text: Option<String>,
    #[serde(rename = "Settings", skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, String>>,
    /// Remaining top-level properties ("Planning Time", ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, PropValue>,
}

impl PlanRoot {
    /// Creates a plan root around the given root node.
    pub fn new(plan: PlanNode) -> Self {
        Self {
            plan,
            triggers: None,
            jit: None,
            query_text: None,
            settings: None,
            extra: BTreeMap::new(),
        }
    }

    /// Returns an iterator over all nodes in the plan, depth-first.
    pub fn iter_nodes(&self) -> PlanNodeIter<'_> {
        self.plan.iter()
    }

    /// Finds all nodes with the given operator kind.
    pub fn find_nodes_by_kind(&self, kind: &str) -> Vec<&PlanNode> {
        self.iter_nodes().filter(|n| n.node_type == kind).collect()
    }

    /// Planning time in milliseconds, if the source reported it.
    pub fn planning_time(&self) -> Option<f64> {
        self.extra.get("Planning Time").and_then(PropValue::as_number)
    }

    /// Execution time in milliseconds, if the source reported it.
    ///
    /// Older servers report "Total Runtime" instead of "Execution Time".
    pub fn execution_time(&self) -> Option<f64> {
        self.extra
            .get("Execution Time")
            .or_else(|| self.extra.get("Total Runtime"))
            .and_then(PropValue::as_number)
    }
}

/// Iterator traversing plan nodes depth-first.
pub struct PlanNodeIter<'a> {
    stack: Vec<&'a PlanNode>,
}

impl<'a> PlanNodeIter<'a> {
    fn new(root: &'a PlanNode) -> Self {
        Self { stack: vec![root] }
    }
}

impl<'a> Iterator for PlanNodeIter<'a> {
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
