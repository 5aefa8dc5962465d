//! Query splitting: sibling collections under one parent multiply row counts
//! against each other when joined into one query and break key-changed boundary
//! detection, so each sibling is carved out into its own correlated plan.
//!
//! Only same-parent sibling collections force a split; a lone collection —
//! nested collections included — stays combined. The rule applies recursively
//! inside each carved branch. Every branch plan re-establishes the root row set
//! (same restriction, or the same paged/ordered subquery when pagination
//! applies) and reaches its collection through Inner correlation joins.

use std::collections::HashSet;

use log::debug;

use crate::model_catalog::EntityCatalog;
use crate::query_planner::errors::QueryPlannerError;
use crate::query_planner::expr;
use crate::query_planner::join_builder::{
    self, assemble_projection, push_key_ordering, run_columns, RunSpec,
};
use crate::query_planner::navigation_tree::{
    IncludeModifiers, NavigationNode, NavigationStep, NavigationTree,
};
use crate::query_planner::pagination;
use crate::query_planner::plan::{AbstractQueryPlan, JoinClause, JoinKind, RootSource};
use crate::query_planner::plan_ctx::{alias_base, PlanCtx};
use crate::query_request::FetchQuery;

/// One correlation step between the root and a carved-out collection.
#[derive(Debug, Clone)]
pub(crate) struct PathLink {
    pub step: NavigationStep,
    pub modifiers: IncludeModifiers,
}

impl PathLink {
    fn from_node(node: &NavigationNode) -> Self {
        PathLink {
            step: node.step.clone(),
            modifiers: node.modifiers.clone(),
        }
    }
}

/// A collection branch carved out of the combined plan: the navigation steps
/// from the root to its parent, and the collection's own (already
/// re-partitioned) subtree.
#[derive(Debug, Clone)]
pub(crate) struct BranchSpec {
    pub path: Vec<PathLink>,
    pub subtree: NavigationNode,
}

/// The split decision: the reduced main tree plus carved branches in traversal
/// order. No branches means a single combined plan suffices.
pub(crate) struct SplitLayout {
    pub main: NavigationTree,
    pub branches: Vec<BranchSpec>,
}

pub(crate) fn partition(tree: &NavigationTree) -> SplitLayout {
    let mut main = tree.clone();
    let mut branches = Vec::new();
    let mut path = Vec::new();
    visit(&mut main.children, &mut path, &mut branches);
    if !branches.is_empty() {
        debug!(
            "sibling collections force split: {} branch plan(s) carved out",
            branches.len()
        );
    }
    SplitLayout { main, branches }
}

fn visit(
    children: &mut Vec<NavigationNode>,
    path: &mut Vec<PathLink>,
    branches: &mut Vec<BranchSpec>,
) {
    // Duplicate branches of the *same* navigation stay combined (a re-declared
    // include yields two independent joins, not a split); only distinct
    // sibling collections multiply against each other.
    let sibling_collections = children
        .iter()
        .filter(|c| c.is_collection())
        .map(|c| c.step.name.as_str())
        .collect::<HashSet<_>>()
        .len();
    if sibling_collections >= 2 {
        let mut kept = Vec::new();
        for mut child in children.drain(..) {
            path.push(PathLink::from_node(&child));
            if child.is_collection() {
                // Re-partition inside the carved subtree first, so nested
                // sibling collisions split too; the parent branch is listed
                // before the branches carved out of it.
                let mut nested = Vec::new();
                visit(&mut child.children, path, &mut nested);
                path.pop();
                branches.push(BranchSpec {
                    path: path.clone(),
                    subtree: child,
                });
                branches.append(&mut nested);
            } else {
                visit(&mut child.children, path, branches);
                path.pop();
                kept.push(child);
            }
        }
        *children = kept;
    } else {
        for child in children.iter_mut() {
            path.push(PathLink::from_node(child));
            visit(&mut child.children, path, branches);
            path.pop();
        }
    }
}

/// Build one correlated branch plan. The correlation chain (root → … → the
/// split collection) joins Inner throughout: the first plan of the set already
/// produced every root row, so the branch needs no NULL padding.
pub(crate) fn build_branch_plan(
    branch: &BranchSpec,
    query: &FetchQuery,
    catalog: &EntityCatalog,
) -> Result<AbstractQueryPlan, QueryPlannerError> {
    let root = catalog.entity(&query.root_entity)?;
    let mut ctx = PlanCtx::new(catalog);

    let first_step = branch
        .path
        .first()
        .map(|l| &l.step)
        .unwrap_or(&branch.subtree.step);
    let derived = query.restricts_root_rows();
    let (root_source, root_alias) = if derived {
        // tie_break_keys: the branch must reproduce the first plan's row set
        // exactly, so the shared subquery's ordering is made total.
        let paged = pagination::build_paged_root(
            query,
            catalog,
            root,
            &first_step.source_key,
            &mut ctx.aliases,
            true,
        )?;
        // The branch's own ordering leads with the correlation keys; the
        // subquery still carries the user ordering internally so its row set
        // matches the first plan's.
        (paged.source, paged.alias)
    } else {
        let alias = ctx.aliases.allocate(&alias_base(&root.name));
        (
            RootSource::Table {
                schema: root.schema.clone(),
                table: root.table.clone(),
                alias: alias.clone(),
            },
            alias,
        )
    };

    let mut joins = Vec::new();
    let mut left_alias = root_alias.clone();
    let mut path_names: Vec<String> = Vec::new();
    let mut path_joined = Vec::new();
    for link in &branch.path {
        let alias = ctx.aliases.allocate(&alias_base(&link.step.name));
        path_names.push(link.step.name.clone());
        joins.push(JoinClause {
            left_alias: left_alias.clone(),
            right_alias: alias.clone(),
            kind: JoinKind::Inner,
            source: join_builder::join_source(&link.step, &link.modifiers, &alias, catalog)?,
            on: link
                .step
                .source_key
                .iter()
                .cloned()
                .zip(link.step.target_key.iter().cloned())
                .collect(),
        });
        let entity = catalog.entity(&link.step.target_entity)?;
        path_joined.push((alias.clone(), path_names.clone(), entity));
        left_alias = alias;
    }

    let subtree_alias = ctx.aliases.allocate(&alias_base(&branch.subtree.step.name));
    path_names.push(branch.subtree.step.name.clone());
    joins.push(JoinClause {
        left_alias,
        right_alias: subtree_alias.clone(),
        kind: JoinKind::Inner,
        source: join_builder::join_source(
            &branch.subtree.step,
            &branch.subtree.modifiers,
            &subtree_alias,
            catalog,
        )?,
        on: branch
            .subtree
            .step
            .source_key
            .iter()
            .cloned()
            .zip(branch.subtree.step.target_key.iter().cloned())
            .collect(),
    });

    let mut navs = Vec::new();
    join_builder::build_joins(
        &branch.subtree.children,
        &subtree_alias,
        &path_names,
        &mut ctx,
        &mut joins,
        &mut navs,
    )?;

    // Correlation keys first (root, then each path hop), then the branch
    // subtree's columns depth-first.
    let projection = query.projection.as_ref();
    let mut runs = vec![RunSpec {
        alias: root_alias.clone(),
        navigation: Vec::new(),
        entity: root,
        columns: root.key.clone(),
    }];
    for (alias, path, entity) in &path_joined {
        runs.push(RunSpec {
            alias: alias.clone(),
            navigation: path.clone(),
            entity: *entity,
            columns: entity.key.clone(),
        });
    }
    let subtree_entity = catalog.entity(&branch.subtree.step.target_entity)?;
    runs.push(RunSpec {
        alias: subtree_alias.clone(),
        navigation: path_names.clone(),
        entity: subtree_entity,
        columns: run_columns(subtree_entity, &path_names, projection),
    });
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

    let mut ordering = Vec::new();
    let mut seen = HashSet::new();
    push_key_ordering(&mut ordering, &mut seen, &root_alias, &root.key);
    for (alias, _, entity) in &path_joined {
        push_key_ordering(&mut ordering, &mut seen, alias, &entity.key);
    }
    push_key_ordering(&mut ordering, &mut seen, &subtree_alias, &subtree_entity.key);
    for nav in &navs {
        let entity = catalog.entity(&nav.node.step.target_entity)?;
        push_key_ordering(&mut ordering, &mut seen, &nav.alias, &entity.key);
    }

    let restriction = if derived {
        None
    } else {
        query
            .filter
            .as_ref()
            .map(|f| expr::predicate_to_plan(f, &root_alias, root))
            .transpose()?
    };

    Ok(AbstractQueryPlan {
        root: root_source,
        joins,
        projection: projected,
        column_runs,
        restriction,
        ordering,
        pagination: None,
        distinct: false,
        no_tracking: query.no_tracking,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_catalog::NavigationKind;

    fn collection_node(name: &str, children: Vec<NavigationNode>) -> NavigationNode {
        NavigationNode {
            step: NavigationStep {
                name: name.into(),
                kind: NavigationKind::Collection,
                target_entity: name.into(),
                source_key: vec!["id".into()],
                target_key: vec!["parent_id".into()],
            },
            modifiers: IncludeModifiers::default(),
            children,
        }
    }

    fn reference_node(name: &str, children: Vec<NavigationNode>) -> NavigationNode {
        NavigationNode {
            step: NavigationStep {
                name: name.into(),
                kind: NavigationKind::Reference { required: false },
                target_entity: name.into(),
                source_key: vec!["fk".into()],
                target_key: vec!["id".into()],
            },
            modifiers: IncludeModifiers::default(),
            children,
        }
    }

    fn tree(children: Vec<NavigationNode>) -> NavigationTree {
        NavigationTree {
            root_entity: "Root".into(),
            children,
        }
    }

    #[test]
    fn single_collection_does_not_split() {
        let layout = partition(&tree(vec![collection_node("A", vec![])]));
        assert!(layout.branches.is_empty());
        assert_eq!(layout.main.children.len(), 1);
    }

    #[test]
    fn nested_lone_collections_do_not_split() {
        let layout = partition(&tree(vec![collection_node(
            "A",
            vec![collection_node("B", vec![])],
        )]));
        assert!(layout.branches.is_empty());
    }

    #[test]
    fn duplicate_collection_branches_do_not_split() {
        let layout = partition(&tree(vec![
            collection_node("A", vec![]),
            collection_node("A", vec![]),
        ]));
        assert!(layout.branches.is_empty());
        assert_eq!(layout.main.children.len(), 2);
    }

    #[test]
    fn sibling_collections_split_into_branches() {
        let layout = partition(&tree(vec![
            collection_node("A", vec![]),
            collection_node("B", vec![]),
        ]));
        assert_eq!(layout.branches.len(), 2);
        assert!(layout.main.children.is_empty());
        assert!(layout.branches[0].path.is_empty());
        assert_eq!(layout.branches[0].subtree.step.name, "A");
        assert_eq!(layout.branches[1].subtree.step.name, "B");
    }

    #[test]
    fn references_stay_in_main_tree() {
        let layout = partition(&tree(vec![
            collection_node("A", vec![]),
            collection_node("B", vec![]),
            reference_node("R", vec![]),
        ]));
        assert_eq!(layout.branches.len(), 2);
        assert_eq!(layout.main.children.len(), 1);
        assert_eq!(layout.main.children[0].step.name, "R");
    }

    #[test]
    fn sibling_collision_under_reference_splits_with_path() {
        let layout = partition(&tree(vec![reference_node(
            "R",
            vec![collection_node("A", vec![]), collection_node("B", vec![])],
        )]));
        assert_eq!(layout.branches.len(), 2);
        assert_eq!(layout.branches[0].path.len(), 1);
        assert_eq!(layout.branches[0].path[0].step.name, "R");
    }

    #[test]
    fn nested_sibling_collision_splits_recursively() {
        // One collection at the root, two sibling collections inside it: the
        // outer collection splits nothing, the inner collision carves two
        // branches whose paths run through the outer collection.
        let layout = partition(&tree(vec![collection_node(
            "A",
            vec![collection_node("B", vec![]), collection_node("C", vec![])],
        )]));
        assert_eq!(layout.branches.len(), 2);
        assert_eq!(layout.branches[0].path[0].step.name, "A");
        assert_eq!(layout.branches[0].subtree.step.name, "B");
        assert_eq!(layout.branches[1].subtree.step.name, "C");
        // the outer collection stays in the main tree, now childless
        assert_eq!(layout.main.children.len(), 1);
        assert!(layout.main.children[0].children.is_empty());
    }
}
