//! Navigation path resolution: include path lists become an immutable tree.
//!
//! Paths sharing a prefix merge into shared nodes; exact-duplicate full paths
//! are retained as *separate* sibling branches — the engine never deduplicates
//! two requests for the same physical relation, because each may carry its own
//! downstream filters and paging. The tree is built once per compilation and
//! never mutated afterwards (projection pruning happens before plan building,
//! as part of construction).

use std::collections::HashSet;

use crate::model_catalog::{EntityCatalog, NavigationKind, NavigationSchema};
use crate::query_planner::errors::QueryPlannerError;
use crate::query_request::{FetchQuery, IncludePath, Predicate, Projection, SortKey};

/// One resolved navigation edge.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationStep {
    pub name: String,
    pub kind: NavigationKind,
    pub target_entity: String,
    pub source_key: Vec<String>,
    pub target_key: Vec<String>,
}

impl NavigationStep {
    fn from_schema(nav: &NavigationSchema) -> Self {
        NavigationStep {
            name: nav.name.clone(),
            kind: nav.kind,
            target_entity: nav.target_entity.clone(),
            source_key: nav.source_key.clone(),
            target_key: nav.target_key.clone(),
        }
    }

    pub fn is_collection(&self) -> bool {
        self.kind.is_collection()
    }
}

/// Per-include modifiers, attached to the terminal node of a declared path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IncludeModifiers {
    pub filter: Option<Predicate>,
    pub ordering: Vec<SortKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: bool,
}

impl IncludeModifiers {
    fn from_include(include: &IncludePath) -> Self {
        IncludeModifiers {
            filter: include.filter.clone(),
            ordering: include.ordering.clone(),
            skip: include.skip,
            take: include.take,
            distinct: include.distinct,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationNode {
    pub step: NavigationStep,
    pub modifiers: IncludeModifiers,
    pub children: Vec<NavigationNode>,
}

impl NavigationNode {
    pub fn is_collection(&self) -> bool {
        self.step.is_collection()
    }

    pub fn subtree_has_collection(&self) -> bool {
        self.is_collection() || self.children.iter().any(NavigationNode::subtree_has_collection)
    }
}

/// The resolved include tree. The root is synthetic — it stands for the
/// originally queried entity; `children` are its requested navigations in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationTree {
    pub root_entity: String,
    pub children: Vec<NavigationNode>,
}

impl NavigationTree {
    pub fn has_collection(&self) -> bool {
        self.children.iter().any(NavigationNode::subtree_has_collection)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// Resolve the query's include paths against the catalog, then apply
/// projection pruning. Fails on unknown navigations and on paths addressing
/// scalar columns; duplicate declared paths fork into independent branches.
pub fn resolve(
    query: &FetchQuery,
    catalog: &EntityCatalog,
) -> Result<NavigationTree, QueryPlannerError> {
    catalog.entity(&query.root_entity)?;

    let mut tree = NavigationTree {
        root_entity: query.root_entity.clone(),
        children: Vec::new(),
    };
    let mut declared: HashSet<Vec<String>> = HashSet::new();

    for include in &query.includes {
        if include.segments.is_empty() {
            return Err(QueryPlannerError::UnsupportedExpression(
                "empty include path".to_string(),
            ));
        }
        let duplicate = declared.contains(&include.segments);
        insert_path(&mut tree, catalog, include, duplicate)?;
        declared.insert(include.segments.clone());
    }

    if let Some(projection) = &query.projection {
        prune_for_projection(&mut tree, projection, catalog)?;
    }
    Ok(tree)
}

fn insert_path(
    tree: &mut NavigationTree,
    catalog: &EntityCatalog,
    include: &IncludePath,
    duplicate: bool,
) -> Result<(), QueryPlannerError> {
    let mut entity = catalog.entity(&tree.root_entity)?;
    let mut children = &mut tree.children;
    let last = include.segments.len() - 1;

    for (i, segment) in include.segments.iter().enumerate() {
        let nav = match entity.navigation(segment) {
            Some(nav) => nav,
            None if entity.has_column(segment) => {
                return Err(QueryPlannerError::InvalidPath {
                    entity: entity.name.clone(),
                    member: segment.clone(),
                    path: include.dotted(),
                });
            }
            None => {
                return Err(QueryPlannerError::UnknownNavigation {
                    entity: entity.name.clone(),
                    navigation: segment.clone(),
                    path: include.dotted(),
                });
            }
        };
        let terminal = i == last;

        // A re-declared full path forces a fresh sibling at its terminal
        // segment; prefixes always merge into the first matching child.
        let reuse = if terminal && duplicate {
            None
        } else {
            children.iter().position(|c| c.step.name == *segment)
        };
        let idx = match reuse {
            Some(idx) => {
                if terminal {
                    children[idx].modifiers = IncludeModifiers::from_include(include);
                }
                idx
            }
            None => {
                children.push(NavigationNode {
                    step: NavigationStep::from_schema(nav),
                    modifiers: if terminal {
                        IncludeModifiers::from_include(include)
                    } else {
                        IncludeModifiers::default()
                    },
                    children: Vec::new(),
                });
                children.len() - 1
            }
        };

        entity = catalog.entity(&nav.target_entity)?;
        let current = children;
        children = &mut current[idx].children;
    }
    Ok(())
}

// ============================================================================
// Projection pruning
// ============================================================================

/// Projection wins over include: a branch survives only when the projection
/// retains the branch entity's full key at the branch's path (and the root's
/// key columns). Everything else is silently removed — by policy, not error.
/// Only irreconcilable projection columns (path not included, or column not on
/// the resolved entity) fail.
fn prune_for_projection(
    tree: &mut NavigationTree,
    projection: &Projection,
    catalog: &EntityCatalog,
) -> Result<(), QueryPlannerError> {
    validate_projection(tree, projection, catalog)?;

    let projected: HashSet<(&[String], &str)> = projection
        .columns
        .iter()
        .map(|c| (c.path.as_slice(), c.column.as_str()))
        .collect();

    let root = catalog.entity(&tree.root_entity)?;
    let root_keys_projected = root
        .key
        .iter()
        .all(|k| projected.contains(&(&[] as &[String], k.as_str())));
    if !root_keys_projected {
        if !tree.children.is_empty() {
            log::debug!(
                "pruning all include branches: projection omits root key of '{}'",
                tree.root_entity
            );
        }
        tree.children.clear();
        return Ok(());
    }

    let mut path = Vec::new();
    retain_projected(&mut tree.children, &mut path, &projected, catalog)?;
    Ok(())
}

fn retain_projected(
    children: &mut Vec<NavigationNode>,
    path: &mut Vec<String>,
    projected: &HashSet<(&[String], &str)>,
    catalog: &EntityCatalog,
) -> Result<(), QueryPlannerError> {
    let mut kept = Vec::with_capacity(children.len());
    for mut child in children.drain(..) {
        path.push(child.step.name.clone());
        let entity = catalog.entity(&child.step.target_entity)?;
        let keys_projected = entity
            .key
            .iter()
            .all(|k| projected.contains(&(path.as_slice(), k.as_str())));
        if keys_projected {
            retain_projected(&mut child.children, path, projected, catalog)?;
            kept.push(child);
        } else {
            log::debug!(
                "pruning include branch '{}': projection omits its key columns",
                path.join(".")
            );
        }
        path.pop();
    }
    *children = kept;
    Ok(())
}

fn validate_projection(
    tree: &NavigationTree,
    projection: &Projection,
    catalog: &EntityCatalog,
) -> Result<(), QueryPlannerError> {
    for column in &projection.columns {
        let entity_name = if column.path.is_empty() {
            tree.root_entity.clone()
        } else {
            match entity_at_path(&tree.children, &column.path) {
                Some(entity) => entity,
                None => {
                    return Err(QueryPlannerError::AmbiguousProjection(format!(
                        "projection path '{}' is not an included navigation",
                        column.path.join(".")
                    )));
                }
            }
        };
        let entity = catalog.entity(&entity_name)?;
        if !entity.has_column(&column.column) {
            return Err(QueryPlannerError::AmbiguousProjection(format!(
                "projection column '{}' does not exist on entity '{}'",
                column.column, entity_name
            )));
        }
    }
    Ok(())
}

fn entity_at_path(children: &[NavigationNode], path: &[String]) -> Option<String> {
    let (first, rest) = path.split_first()?;
    let node = children.iter().find(|c| c.step.name == *first)?;
    if rest.is_empty() {
        Some(node.step.target_entity.clone())
    } else {
        entity_at_path(&node.children, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_catalog::{ColumnSchema, EntitySchema};
    use crate::query_request::Projection;

    fn entity(
        name: &str,
        table: &str,
        columns: &[&str],
        key: &[&str],
        navigations: Vec<NavigationSchema>,
    ) -> EntitySchema {
        EntitySchema {
            name: name.into(),
            schema: "dbo".into(),
            table: table.into(),
            columns: columns
                .iter()
                .map(|c| ColumnSchema { name: c.to_string() })
                .collect(),
            key: key.iter().map(|k| k.to_string()).collect(),
            navigations,
        }
    }

    fn collection(name: &str, target: &str, source_key: &str, target_key: &str) -> NavigationSchema {
        NavigationSchema {
            name: name.into(),
            target_entity: target.into(),
            kind: NavigationKind::Collection,
            source_key: vec![source_key.into()],
            target_key: vec![target_key.into()],
        }
    }

    fn catalog() -> EntityCatalog {
        EntityCatalog::new(
            "test",
            vec![
                entity(
                    "Customer",
                    "Customers",
                    &["CustomerID", "City"],
                    &["CustomerID"],
                    vec![collection("Orders", "Order", "CustomerID", "CustomerID")],
                ),
                entity(
                    "Order",
                    "Orders",
                    &["OrderID", "CustomerID"],
                    &["OrderID"],
                    vec![collection("OrderDetails", "OrderDetail", "OrderID", "OrderID")],
                ),
                entity(
                    "OrderDetail",
                    "Order Details",
                    &["OrderID", "ProductID"],
                    &["OrderID", "ProductID"],
                    vec![],
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn shared_prefixes_merge() {
        let query = FetchQuery::new("Customer")
            .include("Orders")
            .include("Orders.OrderDetails");
        let tree = resolve(&query, &catalog()).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);
        assert_eq!(tree.children[0].children[0].step.name, "OrderDetails");
    }

    #[test]
    fn duplicate_paths_fork_into_sibling_branches() {
        let query = FetchQuery::new("Customer").include("Orders").include("Orders");
        let tree = resolve(&query, &catalog()).unwrap();
        assert_eq!(tree.children.len(), 2);
        assert_eq!(tree.children[0].step.name, "Orders");
        assert_eq!(tree.children[1].step.name, "Orders");
    }

    #[test]
    fn duplicate_multi_level_path_forks_at_terminal() {
        let query = FetchQuery::new("Customer")
            .include("Orders.OrderDetails")
            .include("Orders.OrderDetails");
        let tree = resolve(&query, &catalog()).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 2);
    }

    #[test]
    fn unknown_navigation_is_rejected() {
        let query = FetchQuery::new("Customer").include("Invoices");
        let err = resolve(&query, &catalog()).unwrap_err();
        assert!(matches!(err, QueryPlannerError::UnknownNavigation { .. }));
    }

    #[test]
    fn path_through_scalar_column_is_rejected() {
        let query = FetchQuery::new("Customer").include("City.Something");
        let err = resolve(&query, &catalog()).unwrap_err();
        assert!(matches!(
            err,
            QueryPlannerError::InvalidPath { ref member, .. } if member == "City"
        ));
    }

    #[test]
    fn projection_without_branch_keys_prunes_branch() {
        let query = FetchQuery::new("Customer")
            .include("Orders")
            .select(Projection::root_columns(["CustomerID", "City"]));
        let tree = resolve(&query, &catalog()).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn projection_with_branch_keys_keeps_branch() {
        let query = FetchQuery::new("Customer").include("Orders").select(
            Projection::root_columns(["CustomerID"]).with(&["Orders"], "OrderID"),
        );
        let tree = resolve(&query, &catalog()).unwrap();
        assert_eq!(tree.children.len(), 1);
    }

    #[test]
    fn projection_omitting_root_key_prunes_everything() {
        let query = FetchQuery::new("Customer")
            .include("Orders")
            .select(Projection::root_columns(["City"]).with(&["Orders"], "OrderID"));
        let tree = resolve(&query, &catalog()).unwrap();
        assert!(tree.is_empty());
    }

    #[test]
    fn irreconcilable_projection_path_errors() {
        let query = FetchQuery::new("Customer")
            .select(Projection::root_columns(["CustomerID"]).with(&["Orders"], "OrderID"));
        let err = resolve(&query, &catalog()).unwrap_err();
        assert!(matches!(err, QueryPlannerError::AmbiguousProjection(_)));
    }
}
