//! Planviz Analyzer - EXPLAIN plan parsing
//!
//! This crate provides functionality for:
//! - Parsing PostgreSQL EXPLAIN output (text and JSON formats) into a typed plan tree
//! - Cleaning up terminal-decorated or force-wrapped EXPLAIN text
//! - Exposing the parsed tree for downstream visualization tooling

pub mod explain;

pub use explain::*;
