//! Query translation core: compiles a [`FetchQuery`] against an
//! [`EntityCatalog`] into one [`QueryPlanSet`].
//!
//! The pipeline is a pure, synchronous computation over the immutable catalog
//! snapshot and request — no I/O, no blocking, no retries; a compilation either
//! completes or fails once, deterministically:
//!
//! 1. navigation path resolution (include paths → navigation tree, with
//!    projection pruning),
//! 2. split decision (sibling collections carve correlated branch plans),
//! 3. join plan construction per physical plan, with the pagination/ordering
//!    rewrite pushing root restrictions into a derived table whenever they meet
//!    a collection join.
//!
//! Alias and column-name allocation is threaded through an explicit
//! per-compilation context, so independent compilations can run concurrently
//! against a shared catalog.

use log::debug;

pub mod errors;
pub mod navigation_tree;
pub mod plan;
pub mod plan_ctx;

mod expr;
mod join_builder;
mod pagination;
mod query_split;

use crate::model_catalog::EntityCatalog;
use crate::query_request::FetchQuery;
use errors::QueryPlannerError;
use plan::{QueryPlanSet, SplitQueryPlan};

/// Compile a fetch request into its finalized plan set.
pub fn compile(
    query: &FetchQuery,
    catalog: &EntityCatalog,
) -> Result<QueryPlanSet, QueryPlannerError> {
    let tree = navigation_tree::resolve(query, catalog)?;
    debug!(
        "resolved include tree for '{}': {} top-level branch(es)",
        query.root_entity,
        tree.children.len()
    );

    let layout = query_split::partition(&tree);
    if layout.branches.is_empty() {
        let plan = join_builder::build_plan(&layout.main, query, catalog, false)?;
        debug!("compiled single plan:\n{plan}");
        return Ok(QueryPlanSet::Single(plan));
    }

    let mut plans = Vec::with_capacity(layout.branches.len() + 1);
    let mut main_plan = join_builder::build_plan(&layout.main, query, catalog, true)?;
    join_builder::append_boundary_ordering(&mut main_plan, catalog)?;
    plans.push(main_plan);
    for branch in &layout.branches {
        plans.push(query_split::build_branch_plan(branch, query, catalog)?);
    }
    debug!("compiled split plan set with {} plan(s)", plans.len());
    Ok(QueryPlanSet::Split(SplitQueryPlan { plans }))
}
