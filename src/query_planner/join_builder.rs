//! Join plan construction: walks the navigation tree depth-first and emits the
//! ordered join list, the depth-first projection with stitching runs, and the
//! final ordering for one physical plan.
//!
//! Join kind selection is per edge: required references join Inner, optional
//! references and collections join LeftOuter — a root row with no related rows
//! must still appear, with the collection's columns NULL. Per-include modifiers
//! never move into the outer WHERE; they restrict the join's right side *before*
//! the join so LEFT OUTER semantics stay intact.

use std::collections::HashSet;

use log::debug;

use crate::model_catalog::{EntityCatalog, EntitySchema};
use crate::query_planner::errors::QueryPlannerError;
use crate::query_planner::expr;
use crate::query_planner::navigation_tree::{
    IncludeModifiers, NavigationNode, NavigationStep, NavigationTree,
};
use crate::query_planner::pagination;
use crate::query_planner::plan::{
    AbstractQueryPlan, ColumnRun, JoinClause, JoinKind, JoinSource, OrderingItem, Pagination,
    PartitionLimit, PlanExpr, ProjectedColumn, ProjectedExpr, RootSource,
};
use crate::query_planner::plan_ctx::{alias_base, NameAllocator, PlanCtx};
use crate::query_request::{FetchQuery, Projection, SortDirection};

/// A navigation joined into the current plan, in depth-first emission order.
pub(crate) struct JoinedNav<'t> {
    pub node: &'t NavigationNode,
    pub alias: String,
    pub path: Vec<String>,
}

pub(crate) fn join_kind(step: &NavigationStep) -> JoinKind {
    if step.kind.is_required() {
        JoinKind::Inner
    } else {
        JoinKind::LeftOuter
    }
}

/// Derive the join's right-side source from the navigation's target table and
/// the include's modifiers.
pub(crate) fn join_source(
    step: &NavigationStep,
    modifiers: &IncludeModifiers,
    right_alias: &str,
    catalog: &EntityCatalog,
) -> Result<JoinSource, QueryPlannerError> {
    let target = catalog.entity(&step.target_entity)?;
    let pre_filter = modifiers
        .filter
        .as_ref()
        .map(|f| expr::predicate_to_plan(f, right_alias, target))
        .transpose()?;
    let partition_limit = if modifiers.skip.is_some()
        || modifiers.take.is_some()
        || !modifiers.ordering.is_empty()
    {
        Some(PartitionLimit {
            partition_by: step.target_key.clone(),
            ordering: expr::sort_keys_to_plan(&modifiers.ordering, right_alias, target)?,
            offset: modifiers.skip,
            limit: modifiers.take,
        })
    } else {
        None
    };
    Ok(JoinSource {
        schema: target.schema.clone(),
        table: target.table.clone(),
        pre_filter,
        distinct: modifiers.distinct,
        partition_limit,
    })
}

/// Emit joins for a subtree, depth-first in declaration order, allocating a
/// fresh alias per physical table instance.
pub(crate) fn build_joins<'t>(
    children: &'t [NavigationNode],
    parent_alias: &str,
    parent_path: &[String],
    ctx: &mut PlanCtx<'_>,
    joins: &mut Vec<JoinClause>,
    navs: &mut Vec<JoinedNav<'t>>,
) -> Result<(), QueryPlannerError> {
    for node in children {
        let alias = ctx.aliases.allocate(&alias_base(&node.step.name));
        let mut path = parent_path.to_vec();
        path.push(node.step.name.clone());
        joins.push(JoinClause {
            left_alias: parent_alias.to_string(),
            right_alias: alias.clone(),
            kind: join_kind(&node.step),
            source: join_source(&node.step, &node.modifiers, &alias, ctx.catalog)?,
            on: node
                .step
                .source_key
                .iter()
                .cloned()
                .zip(node.step.target_key.iter().cloned())
                .collect(),
        });
        navs.push(JoinedNav {
            node,
            alias: alias.clone(),
            path: path.clone(),
        });
        build_joins(&node.children, &alias, &path, ctx, joins, navs)?;
    }
    Ok(())
}

/// The columns a run projects for `entity` at `path`: the full declared column
/// list, or — under an explicit projection — the declared columns the
/// projection retains there (entity declaration order either way).
pub(crate) fn run_columns(
    entity: &EntitySchema,
    path: &[String],
    projection: Option<&Projection>,
) -> Vec<String> {
    match projection {
        None => entity.column_names().map(str::to_string).collect(),
        Some(p) => entity
            .column_names()
            .filter(|c| {
                p.columns
                    .iter()
                    .any(|pc| pc.path.as_slice() == path && pc.column == *c)
            })
            .map(str::to_string)
            .collect(),
    }
}

pub(crate) struct RunSpec<'a> {
    pub alias: String,
    pub navigation: Vec<String>,
    pub entity: &'a EntitySchema,
    pub columns: Vec<String>,
}

/// Assemble the plan projection from ordered runs. Output-name collision
/// numbering is scoped to this call — one allocator per derived-table
/// boundary, so nested plans restart their numbering.
pub(crate) fn assemble_projection(runs: &[RunSpec<'_>]) -> (Vec<ProjectedColumn>, Vec<ColumnRun>) {
    let mut namer = NameAllocator::new();
    let mut columns = Vec::new();
    let mut column_runs = Vec::with_capacity(runs.len());
    for run in runs {
        let start = columns.len();
        let mut key_ordinals = Vec::new();
        for column in &run.columns {
            if run.entity.key.contains(column) {
                key_ordinals.push(columns.len());
            }
            columns.push(ProjectedColumn {
                source_alias: run.alias.clone(),
                expr: ProjectedExpr::Column(column.clone()),
                output_name: namer.allocate(column),
                navigation: run.navigation.clone(),
            });
        }
        column_runs.push(ColumnRun {
            navigation: run.navigation.clone(),
            alias: run.alias.clone(),
            entity: run.entity.name.clone(),
            start,
            len: columns.len() - start,
            key_ordinals,
        });
    }
    (columns, column_runs)
}

/// Append ascending key ordering for `columns` of `alias`, skipping pairs
/// already ordered on.
pub(crate) fn push_key_ordering(
    items: &mut Vec<OrderingItem>,
    seen: &mut HashSet<(String, String)>,
    alias: &str,
    columns: &[String],
) {
    for column in columns {
        if seen.insert((alias.to_string(), column.clone())) {
            items.push(OrderingItem {
                expr: PlanExpr::column(alias, column),
                direction: SortDirection::Asc,
            });
        }
    }
}

pub(crate) fn seed_ordering_seen(
    items: &[OrderingItem],
    seen: &mut HashSet<(String, String)>,
) {
    for item in items {
        if let PlanExpr::Column { alias, column } = &item.expr {
            seen.insert((alias.clone(), column.clone()));
        }
    }
}

/// Make a plan's row order total by appending each column run's key columns.
/// Applied to the first plan of a split set so branch plans can pair rows with
/// it deterministically.
pub(crate) fn append_boundary_ordering(
    plan: &mut AbstractQueryPlan,
    catalog: &EntityCatalog,
) -> Result<(), QueryPlannerError> {
    let mut seen = HashSet::new();
    seed_ordering_seen(&plan.ordering, &mut seen);
    let runs = plan.column_runs.clone();
    let mut ordering = std::mem::take(&mut plan.ordering);
    for run in &runs {
        let entity = catalog.entity(&run.entity)?;
        push_key_ordering(&mut ordering, &mut seen, &run.alias, &entity.key);
    }
    plan.ordering = ordering;
    Ok(())
}

/// Build one combined plan for a (possibly split-reduced) navigation tree:
/// joins, projection runs, restriction/ordering/pagination placement.
/// `split_mode` marks the first plan of a split set, whose row order must be
/// reproducible by the branch plans.
pub(crate) fn build_plan(
    tree: &NavigationTree,
    query: &FetchQuery,
    catalog: &EntityCatalog,
    split_mode: bool,
) -> Result<AbstractQueryPlan, QueryPlannerError> {
    let root = catalog.entity(&tree.root_entity)?;
    let mut ctx = PlanCtx::new(catalog);

    let rewrite = tree.has_collection() && query.restricts_root_rows();
    let (root_source, root_alias, exposed_ordering) = if rewrite {
        // Columns the outer joins need from the derived table beyond the
        // projected root shape (navigation source keys).
        let extras: Vec<String> = tree
            .children
            .iter()
            .flat_map(|c| c.step.source_key.iter().cloned())
            .collect();
        let paged = pagination::build_paged_root(
            query,
            catalog,
            root,
            &extras,
            &mut ctx.aliases,
            split_mode,
        )?;
        debug!(
            "root restriction pushed into derived table '{}' before collection joins",
            paged.alias
        );
        (paged.source, paged.alias, paged.exposed_ordering)
    } else {
        let alias = ctx.aliases.allocate(&alias_base(&root.name));
        (
            RootSource::Table {
                schema: root.schema.clone(),
                table: root.table.clone(),
                alias: alias.clone(),
            },
            alias,
            Vec::new(),
        )
    };

    let mut joins = Vec::new();
    let mut navs = Vec::new();
    build_joins(&tree.children, &root_alias, &[], &mut ctx, &mut joins, &mut navs)?;

    let projection = query.projection.as_ref();
    let mut runs = vec![RunSpec {
        alias: root_alias.clone(),
        navigation: Vec::new(),
        entity: root,
        columns: run_columns(root, &[], projection),
    }];
    for nav in &navs {
        let entity = catalog.entity(&nav.node.step.target_entity)?;
        runs.push(RunSpec {
            alias: nav.alias.clone(),
            navigation: nav.path.clone(),
            entity,
            columns: run_columns(entity, &nav.path, projection),
        });
    }
    let (projected, column_runs) = assemble_projection(&runs);

    let any_collection = navs.iter().any(|n| n.node.is_collection());
    let mut ordering = Vec::new();
    if any_collection {
        // Total ordering for key-changed boundary detection: the derived
        // table's own ordering columns first, then the root key, then each
        // descendant join's key in traversal order.
        let mut seen = HashSet::new();
        ordering.extend(exposed_ordering);
        seed_ordering_seen(&ordering, &mut seen);
        push_key_ordering(&mut ordering, &mut seen, &root_alias, &root.key);
        for nav in &navs {
            let entity = catalog.entity(&nav.node.step.target_entity)?;
            push_key_ordering(&mut ordering, &mut seen, &nav.alias, &entity.key);
        }
    } else if !rewrite {
        ordering = expr::sort_keys_to_plan(&query.ordering, &root_alias, root)?;
    }

    let restriction = if rewrite {
        None
    } else {
        query
            .filter
            .as_ref()
            .map(|f| expr::predicate_to_plan(f, &root_alias, root))
            .transpose()?
    };

    let (pagination_clause, distinct) = if rewrite || any_collection {
        (None, false)
    } else {
        (
            if query.skip.is_some() || query.take.is_some() {
                Some(Pagination {
                    offset: query.skip,
                    limit: query.take,
                })
            } else {
                None
            },
            query.distinct,
        )
    };

    Ok(AbstractQueryPlan {
        root: root_source,
        joins,
        projection: projected,
        column_runs,
        restriction,
        ordering,
        pagination: pagination_clause,
        distinct,
        no_tracking: query.no_tracking,
    })
}
