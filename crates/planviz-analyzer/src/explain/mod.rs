//! Query EXPLAIN Parser Module
//!
//! This module parses PostgreSQL EXPLAIN output into a typed plan tree:
//! - Text format (default EXPLAIN / EXPLAIN ANALYZE), including terminal-framed
//!   or force-wrapped copies of it
//! - JSON format (EXPLAIN (FORMAT JSON))
//!
//! # Example
//!
//! ```
//! use planviz_analyzer::explain::parse_postgres_explain;
//!
//! // Text EXPLAIN
//! let text = "Seq Scan on users  (cost=0.00..10.50 rows=100 width=36)";
//! let plan = parse_postgres_explain(text).unwrap();
//! assert_eq!(plan.plan.node_type, "Seq Scan");
//! assert_eq!(plan.plan.relation.as_deref(), Some("users"));
//!
//! // JSON EXPLAIN
//! let json = r#"[{"Plan": {"Node Type": "Seq Scan", "Relation Name": "users"}}]"#;
//! let plan = parse_postgres_explain(json).unwrap();
//! assert_eq!(plan.plan.node_type, "Seq Scan");
//! ```

pub mod grammar;
pub mod plan;
pub mod postgres;
pub mod props;
pub mod source;
pub mod split;

pub use plan::{
    JitInfo, JoinKind, ParentRelationship, PlanNode, PlanNodeIter, PlanRoot, PropValue,
    SortGroups, SortSpaceMemory, SortSpaceType, Trigger, Worker,
};
pub use postgres::{
    PostgresExplainError, from_source, parse_json_explain, parse_postgres_explain,
    parse_text_explain,
};
pub use source::{cleanup_source, split_into_lines};
pub use split::split_balanced;
