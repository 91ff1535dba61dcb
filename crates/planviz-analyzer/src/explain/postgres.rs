//! PostgreSQL EXPLAIN Parser
//!
//! Parses EXPLAIN output from PostgreSQL in various formats:
//! - Text format (default EXPLAIN / EXPLAIN ANALYZE), including framed or
//!   force-wrapped copies of it
//! - JSON format (EXPLAIN (FORMAT JSON))
//!
//! The text parser walks the normalized logical lines once, keeping a stack
//! of open ancestors keyed by indentation depth. Nodes live in an arena owned
//! by the parse call; the stack holds arena indices, and the final tree is
//! assembled when the walk completes.
//!
//! # Examples
//!
//! ```
//! use planviz_analyzer::explain::parse_postgres_explain;
//!
//! let text = "\
//! Hash Join  (cost=10.00..100.00 rows=500 width=72)
//!   ->  Seq Scan on orders o  (cost=0.00..50.00 rows=1000 width=36)
//!   ->  Hash  (cost=5.00..10.00 rows=100 width=36)
//!         ->  Seq Scan on users u  (cost=0.00..5.00 rows=100 width=36)";
//!
//! let plan = parse_postgres_explain(text).unwrap();
//! assert_eq!(plan.plan.node_type, "Hash Join");
//! assert_eq!(plan.plan.children.len(), 2);
//! ```

use crate::explain::grammar::{self, Line};
use crate::explain::plan::{JitInfo, ParentRelationship, PlanNode, PlanRoot, PropValue, Trigger, Worker};
use crate::explain::props;
use crate::explain::source::{cleanup_source, split_into_lines};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur when parsing PostgreSQL EXPLAIN output
#[derive(Debug, Error)]
pub enum PostgresExplainError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Missing Plan object in EXPLAIN output")]
    MissingPlan,

    #[error("No plan found in EXPLAIN text")]
    NoPlanFound,
}

/// Result type for PostgreSQL EXPLAIN parsing
pub type Result<T> = std::result::Result<T, PostgresExplainError>;

/// Parses PostgreSQL EXPLAIN output (JSON or text format)
///
/// The source is cleaned up first (frames, quoting, wrapped lines), then the
/// format is detected from the leading character.
pub fn parse_postgres_explain(source: &str) -> Result<PlanRoot> {
    let cleaned = cleanup_source(source);
    let trimmed = cleaned.trim();

    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        parse_json_explain(trimmed)
    } else {
        parse_logical_lines(&split_into_lines(&cleaned))
    }
}

/// Parses PostgreSQL EXPLAIN (FORMAT JSON) output into the typed tree.
///
/// Accepts the usual array wrapper (`[{"Plan": ...}]`) or a bare object.
pub fn parse_json_explain(json: &str) -> Result<PlanRoot> {
    let value: serde_json::Value = serde_json::from_str(json)?;

    // PostgreSQL JSON EXPLAIN wraps the plan in an array
    let content = if let Some(arr) = value.as_array() {
        arr.first().cloned().ok_or(PostgresExplainError::MissingPlan)?
    } else {
        value
    };
    if content.get("Plan").is_none() {
        return Err(PostgresExplainError::MissingPlan);
    }

    Ok(serde_json::from_value(content)?)
}

/// Parses PostgreSQL text-format EXPLAIN output.
pub fn parse_text_explain(text: &str) -> Result<PlanRoot> {
    parse_logical_lines(&split_into_lines(&cleanup_source(text)))
}

/// Parses either dialect, returning text that is always JSON.
///
/// If the cleaned input is already valid JSON it is returned unchanged (so
/// already-structured data is a fixed point); otherwise the text parse result
/// is serialized as a one-element JSON array.
pub fn from_source(source: &str) -> Result<String> {
    let cleaned = cleanup_source(source);
    if serde_json::from_str::<serde_json::Value>(&cleaned).is_ok() {
        return Ok(cleaned);
    }
    let root = parse_logical_lines(&split_into_lines(&cleaned))?;
    Ok(serde_json::to_string(&[root])?)
}

fn parse_logical_lines(lines: &[String]) -> Result<PlanRoot> {
    let mut builder = TextTreeBuilder::default();
    for line in lines {
        builder.process_line(line);
    }
    builder.finish()
}

/// What a cursor entry points at.
enum Element {
    /// An operator node, by arena index.
    Node(usize),
    /// A sub-plan/init-plan/CTE marker: does not own a tree node itself, only
    /// annotates the next node declaration attached through it.
    Marker {
        parent: Option<usize>,
        relationship: ParentRelationship,
        label: String,
    },
    /// The root-level JIT record.
    RootJit,
    /// The JIT record of one worker of one node.
    WorkerJit { node: usize, worker: usize },
}

struct CursorEntry {
    depth: usize,
    element: Element,
}

/// Property dispatch target, copied out of the cursor before mutation.
enum PropTarget {
    Root,
    Node(usize),
    RootJit,
    WorkerJit { node: usize, worker: usize },
}

/// Single-pass builder over classified logical lines.
#[derive(Default)]
struct TextTreeBuilder {
    arena: Vec<PlanNode>,
    child_lists: Vec<Vec<usize>>,
    cursor: Vec<CursorEntry>,
    root_plan: Option<usize>,
    triggers: Vec<Trigger>,
    root_jit: Option<JitInfo>,
    query_text: Option<String>,
    settings: Option<BTreeMap<String, String>>,
    extra: BTreeMap<String, PropValue>,
}

impl TextTreeBuilder {
    fn process_line(&mut self, line: &str) {
        let depth = line.chars().take_while(|c| c.is_whitespace()).count();
        let content = line.trim_start();

        match grammar::classify(content) {
            Line::Empty | Line::Header => {}
            Line::Node(node) => self.on_node(depth, node),
            Line::SubPlanMarker {
                relationship,
                label,
            } => self.on_marker(depth, relationship, label),
            Line::CteMarker { label } => self.on_marker(depth, ParentRelationship::InitPlan, label),
            Line::Worker(worker) => self.on_worker(&worker),
            Line::Trigger(trigger) => {
                self.pop_to(depth);
                self.triggers.push(trigger);
            }
            Line::Jit => self.on_jit(depth),
            Line::Property(content) => self.on_property(depth, &content),
        }
    }

    fn on_node(&mut self, depth: usize, mut node: PlanNode) {
        if self.cursor.is_empty() {
            if self.root_plan.is_some() {
                tracing::warn!(kind = %node.node_type, "second root-level operator dropped");
                return;
            }
            let index = self.push_node(node);
            self.root_plan = Some(index);
            self.cursor.push(CursorEntry {
                depth,
                element: Element::Node(index),
            });
            return;
        }

        self.pop_to(depth);

        let parent = match self.cursor.last() {
            None => None,
            Some(entry) => match &entry.element {
                Element::Node(index) => Some(*index),
                Element::Marker {
                    parent,
                    relationship,
                    label,
                } => {
                    node.parent_relationship = Some(*relationship);
                    node.subplan_name = Some(label.clone());
                    *parent
                }
                Element::RootJit | Element::WorkerJit { .. } => {
                    tracing::warn!(kind = %node.node_type, "operator inside JIT block dropped");
                    return;
                }
            },
        };

        match parent {
            Some(parent) => {
                let index = self.push_node(node);
                self.child_lists[parent].push(index);
                self.cursor.push(CursorEntry {
                    depth,
                    element: Element::Node(index),
                });
            }
            None => {
                if self.root_plan.is_some() {
                    tracing::warn!(kind = %node.node_type, "sibling of root operator dropped");
                    return;
                }
                let index = self.push_node(node);
                self.root_plan = Some(index);
                self.cursor.push(CursorEntry {
                    depth,
                    element: Element::Node(index),
                });
            }
        }
    }

    fn on_marker(&mut self, depth: usize, relationship: ParentRelationship, label: String) {
        self.pop_to(depth);
        let parent = self.cursor.last().and_then(|entry| match &entry.element {
            Element::Node(index) => Some(*index),
            Element::Marker { parent, .. } => *parent,
            Element::RootJit | Element::WorkerJit { .. } => None,
        });
        self.cursor.push(CursorEntry {
            depth,
            element: Element::Marker {
                parent,
                relationship,
                label,
            },
        });
    }

    // Worker lines do not pop the cursor: they belong to whatever node is
    // currently open.
    fn on_worker(&mut self, line: &grammar::WorkerLine) {
        let Some(node_index) = self.top_node_index() else {
            return;
        };
        let workers = self.arena[node_index].workers.get_or_insert_with(Vec::new);
        let position = match workers.iter().position(|w| w.number == line.number) {
            Some(position) => position,
            None => {
                workers.push(Worker::new(line.number));
                workers.len() - 1
            }
        };
        let worker = &mut workers[position];

        if let Some(actual) = &line.actual {
            worker.actual_startup_time = Some(actual.startup_time);
            worker.actual_total_time = Some(actual.total_time);
            worker.actual_rows = Some(actual.rows);
            worker.actual_loops = Some(actual.loops);
        }

        let rest = line.rest.trim();
        if !rest.is_empty() {
            props::apply_worker_property(worker, rest);
        }
    }

    fn on_jit(&mut self, depth: usize) {
        if self.cursor.is_empty() {
            self.root_jit = Some(JitInfo::default());
            self.cursor.push(CursorEntry {
                depth: 1,
                element: Element::RootJit,
            });
            return;
        }
        let Some(node_index) = self.top_node_index() else {
            return;
        };
        let Some(workers) = self.arena[node_index].workers.as_mut() else {
            return;
        };
        let Some(worker_index) = workers.len().checked_sub(1) else {
            return;
        };
        workers[worker_index].jit = Some(JitInfo::default());
        self.cursor.push(CursorEntry {
            depth,
            element: Element::WorkerJit {
                node: node_index,
                worker: worker_index,
            },
        });
    }

    fn on_property(&mut self, depth: usize, content: &str) {
        self.pop_to(depth);
        let target = match self.cursor.last() {
            None => PropTarget::Root,
            Some(entry) => match &entry.element {
                Element::Node(index) => PropTarget::Node(*index),
                Element::Marker {
                    parent: Some(index),
                    ..
                } => PropTarget::Node(*index),
                Element::Marker { parent: None, .. } => PropTarget::Root,
                Element::RootJit => PropTarget::RootJit,
                Element::WorkerJit { node, worker } => PropTarget::WorkerJit {
                    node: *node,
                    worker: *worker,
                },
            },
        };

        match target {
            PropTarget::Root => self.apply_root_property(content),
            PropTarget::Node(index) => props::apply_node_property(&mut self.arena[index], content),
            PropTarget::RootJit => {
                if let Some(jit) = self.root_jit.as_mut() {
                    props::apply_jit_property(jit, content);
                }
            }
            PropTarget::WorkerJit { node, worker } => {
                if let Some(jit) = self.arena[node]
                    .workers
                    .as_mut()
                    .and_then(|workers| workers.get_mut(worker))
                    .and_then(|w| w.jit.as_mut())
                {
                    props::apply_jit_property(jit, content);
                }
            }
        }
    }

    fn apply_root_property(&mut self, content: &str) {
        // Before any node is seen, once a query text exists further bare
        // lines are part of the query.
        if self.root_plan.is_none()
            && let Some(query_text) = self.query_text.as_mut()
        {
            query_text.push('\n');
            query_text.push_str(content);
            return;
        }
        if let Some(settings) = props::settings_line(content) {
            self.settings = Some(settings);
            return;
        }
        if let Some((key, value)) = content.split_once(": ")
            && key == "Query Text"
        {
            self.query_text = Some(value.to_string());
            return;
        }
        if let Some((key, value)) = props::fallback_pair(content) {
            self.extra.insert(key, value);
        }
    }

    fn top_node_index(&self) -> Option<usize> {
        self.cursor.last().and_then(|entry| match &entry.element {
            Element::Node(index) => Some(*index),
            Element::Marker { parent, .. } => *parent,
            Element::RootJit | Element::WorkerJit { .. } => None,
        })
    }

    fn push_node(&mut self, node: PlanNode) -> usize {
        self.arena.push(node);
        self.child_lists.push(Vec::new());
        self.arena.len() - 1
    }

    fn pop_to(&mut self, depth: usize) {
        self.cursor.retain(|entry| entry.depth < depth);
    }

    fn finish(self) -> Result<PlanRoot> {
        let Some(root_index) = self.root_plan else {
            return Err(PostgresExplainError::NoPlanFound);
        };
        let mut slots: Vec<Option<PlanNode>> = self.arena.into_iter().map(Some).collect();
        let plan = assemble(&mut slots, &self.child_lists, root_index);
        Ok(PlanRoot {
            plan,
            triggers: if self.triggers.is_empty() {
                None
            } else {
                Some(self.triggers)
            },
            jit: self.root_jit,
            query_text: self.query_text,
            settings: self.settings,
            extra: self.extra,
        })
    }
}

fn assemble(slots: &mut [Option<PlanNode>], child_lists: &[Vec<usize>], index: usize) -> PlanNode {
    let mut node = slots[index].take().unwrap_or_default();
    for &child in &child_lists[index] {
        let child = assemble(slots, child_lists, child);
        node.children.push(child);
    }
    node
}
