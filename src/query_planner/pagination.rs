//! Pagination/ordering rewrite: when the root row set is restricted (skip,
//! take, distinct, or an explicit root ordering) and a collection navigation is
//! included, the restriction must be evaluated over root rows *before* any
//! collection join — otherwise TOP/OFFSET/DISTINCT would apply to the
//! root×collection cross product and silently corrupt cardinality.
//!
//! The rewrite wraps the root projection into an inner derived table carrying
//! the restriction, ordering, pagination, and distinct-ness; every navigation
//! join then attaches to the derived table. Ordering columns are re-exposed as
//! outputs (synthesized expressions claim the name "c") so the outer query can
//! re-establish the root order ahead of the key columns.

use crate::model_catalog::{EntityCatalog, EntitySchema};
use crate::query_planner::errors::QueryPlannerError;
use crate::query_planner::expr;
use crate::query_planner::join_builder::run_columns;
use crate::query_planner::plan::{
    AbstractQueryPlan, ColumnRun, OrderingItem, Pagination, PlanExpr, ProjectedColumn,
    ProjectedExpr, RootSource,
};
use crate::query_planner::plan_ctx::{
    alias_base, NameAllocator, DERIVED_TABLE_BASE, SYNTHESIZED_COLUMN_BASE,
};
use crate::query_request::{FetchQuery, SortDirection};

pub(crate) struct PagedRoot {
    pub source: RootSource,
    pub alias: String,
    /// The inner ordering, re-pointed at the derived table's outputs; the
    /// outer plan's ORDER BY must begin with these.
    pub exposed_ordering: Vec<OrderingItem>,
}

/// Build the paged/ordered root subquery and the outer-facing handle to it.
///
/// `extra_columns` are root columns the outer query needs beyond the projected
/// root shape (navigation source keys); they are exposed but belong to no
/// stitching run. With `tie_break_keys`, the root key is appended to the
/// subquery's internal ordering so its row selection is total — required when
/// the same subquery is re-evaluated across split plans.
pub(crate) fn build_paged_root(
    query: &FetchQuery,
    _catalog: &EntityCatalog,
    root: &EntitySchema,
    extra_columns: &[String],
    outer_aliases: &mut NameAllocator,
    tie_break_keys: bool,
) -> Result<PagedRoot, QueryPlannerError> {
    let mut inner_aliases = NameAllocator::new();
    let inner_alias = inner_aliases.allocate(&alias_base(&root.name));
    let mut namer = NameAllocator::new();

    let base_columns = run_columns(root, &[], query.projection.as_ref());
    let mut projected = Vec::with_capacity(base_columns.len());
    let mut key_ordinals = Vec::new();
    for column in &base_columns {
        if root.key.contains(column) {
            key_ordinals.push(projected.len());
        }
        projected.push(ProjectedColumn {
            source_alias: inner_alias.clone(),
            expr: ProjectedExpr::Column(column.clone()),
            output_name: namer.allocate(column),
            navigation: Vec::new(),
        });
    }
    let root_run = ColumnRun {
        navigation: Vec::new(),
        alias: inner_alias.clone(),
        entity: root.name.clone(),
        start: 0,
        len: projected.len(),
        key_ordinals,
    };

    let mut exposed: Vec<String> = base_columns.clone();
    for column in extra_columns {
        if !exposed.iter().any(|c| c == column) {
            exposed.push(column.clone());
            projected.push(ProjectedColumn {
                source_alias: inner_alias.clone(),
                expr: ProjectedExpr::Column(column.clone()),
                output_name: namer.allocate(column),
                navigation: Vec::new(),
            });
        }
    }

    // Lower the root ordering against the inner alias; anything not already an
    // exposed column gets appended so the outer query can order by it.
    let mut inner_ordering = Vec::with_capacity(query.ordering.len());
    let mut exposed_names = Vec::with_capacity(query.ordering.len());
    for key in &query.ordering {
        let lowered = expr::scalar_to_plan(&key.expr, &inner_alias, root)?;
        let output = match &lowered {
            PlanExpr::Column { column, .. } => {
                if !exposed.iter().any(|c| c == column) {
                    exposed.push(column.clone());
                    projected.push(ProjectedColumn {
                        source_alias: inner_alias.clone(),
                        expr: ProjectedExpr::Column(column.clone()),
                        output_name: namer.allocate(column),
                        navigation: Vec::new(),
                    });
                }
                column.clone()
            }
            PlanExpr::Literal(_) => {
                let output = namer.allocate(SYNTHESIZED_COLUMN_BASE);
                projected.push(ProjectedColumn {
                    source_alias: inner_alias.clone(),
                    expr: ProjectedExpr::Expr(lowered.clone()),
                    output_name: output.clone(),
                    navigation: Vec::new(),
                });
                output
            }
        };
        exposed_names.push((output, key.direction));
        inner_ordering.push(OrderingItem {
            expr: lowered,
            direction: key.direction,
        });
    }
    if tie_break_keys {
        for key in &root.key {
            let already = inner_ordering.iter().any(|item| {
                matches!(&item.expr, PlanExpr::Column { column, .. } if column == key)
            });
            if !already {
                inner_ordering.push(OrderingItem {
                    expr: PlanExpr::column(&inner_alias, key),
                    direction: SortDirection::Asc,
                });
            }
        }
    }

    let restriction = query
        .filter
        .as_ref()
        .map(|f| expr::predicate_to_plan(f, &inner_alias, root))
        .transpose()?;
    let pagination = if query.skip.is_some() || query.take.is_some() {
        Some(Pagination {
            offset: query.skip,
            limit: query.take,
        })
    } else {
        None
    };

    let inner = AbstractQueryPlan {
        root: RootSource::Table {
            schema: root.schema.clone(),
            table: root.table.clone(),
            alias: inner_alias,
        },
        joins: Vec::new(),
        projection: projected,
        column_runs: vec![root_run],
        restriction,
        ordering: inner_ordering,
        pagination,
        distinct: query.distinct,
        no_tracking: query.no_tracking,
    };

    let outer_alias = outer_aliases.allocate(DERIVED_TABLE_BASE);
    let exposed_ordering = exposed_names
        .into_iter()
        .map(|(column, direction)| OrderingItem {
            expr: PlanExpr::column(&outer_alias, column),
            direction,
        })
        .collect();

    Ok(PagedRoot {
        source: RootSource::Derived {
            alias: outer_alias.clone(),
            plan: Box::new(inner),
        },
        alias: outer_alias,
        exposed_ordering,
    })
}
