//! rowgraph - Eager-loading query translation core
//!
//! This crate compiles declarative object-graph fetch requests into relational
//! query plans through:
//! - An entity model catalog describing tables, keys, and navigations
//! - Include path resolution into navigation trees
//! - Join plan construction with deterministic alias allocation
//! - Pagination/ordering rewriting and single-vs-split query decisions
//!
//! The output is one [`query_planner::plan::AbstractQueryPlan`] (or an ordered
//! split sequence) with every join kind, alias, column name, and ordering
//! finalized — dialect renderers and row-to-object stitchers consume it purely
//! structurally.

pub mod model_catalog;
pub mod plan_cache;
pub mod query_planner;
pub mod query_request;
