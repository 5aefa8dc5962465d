//! Entity model catalog: the read-only mapping metadata the planner compiles against.
//!
//! The catalog describes which tables and columns back which entity types and how
//! entities relate (reference and collection navigations with their key columns).
//! Lookups are indexed by entity name plus navigation name rather than held as
//! mutually-referencing objects, so cyclic models (A references B references A)
//! are representable without ownership cycles.
//!
//! A catalog is built once — in code via [`EntityCatalog::new`] or from a YAML
//! definition via [`EntityCatalog::from_yaml`] — validated eagerly, and then
//! treated as an immutable snapshot for the lifetime of all compilations using it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod errors;

use errors::ModelCatalogError;

/// Whether a navigation is to-one or to-many, and for references whether the
/// related row must exist. Required-ness decides the join kind downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationKind {
    Reference { required: bool },
    Collection,
}

impl NavigationKind {
    pub fn is_collection(&self) -> bool {
        matches!(self, NavigationKind::Collection)
    }

    pub fn is_required(&self) -> bool {
        matches!(self, NavigationKind::Reference { required: true })
    }
}

/// A single relation edge declared on an entity.
///
/// `source_key` columns live on the declaring entity, `target_key` columns on
/// the target entity; the two lists are positionally paired and must have the
/// same arity (composite keys are supported).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationSchema {
    pub name: String,
    pub target_entity: String,
    pub kind: NavigationKind,
    pub source_key: Vec<String>,
    pub target_key: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
}

/// One mapped entity type: its backing table and the columns/keys/navigations
/// declared on it. Column and navigation order is declaration order and is
/// significant — projection layout follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    /// Database schema the table lives in, e.g. "dbo".
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnSchema>,
    pub key: Vec<String>,
    pub navigations: Vec<NavigationSchema>,
}

impl EntitySchema {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn navigation(&self, name: &str) -> Option<&NavigationSchema> {
        self.navigations.iter().find(|n| n.name == name)
    }

    /// Declaration-ordered column names.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// Immutable, validated catalog of entity schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCatalog {
    name: String,
    entities: HashMap<String, EntitySchema>,
    /// Declaration order of entity names, kept for deterministic iteration.
    order: Vec<String>,
}

impl EntityCatalog {
    /// Build and validate a catalog from entity schemas. Rejects duplicate
    /// names, dangling navigation targets, unknown key columns, and key arity
    /// mismatches up front so the planner never has to re-check them.
    pub fn new(
        name: impl Into<String>,
        entities: Vec<EntitySchema>,
    ) -> Result<Self, ModelCatalogError> {
        let mut map = HashMap::new();
        let mut order = Vec::with_capacity(entities.len());
        for entity in entities {
            if map.contains_key(&entity.name) {
                return Err(ModelCatalogError::DuplicateEntity(entity.name));
            }
            order.push(entity.name.clone());
            map.insert(entity.name.clone(), entity);
        }
        let catalog = EntityCatalog {
            name: name.into(),
            entities: map,
            order,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a YAML model definition (see [`config`]) into a validated catalog.
    pub fn from_yaml(yaml: &str) -> Result<Self, ModelCatalogError> {
        let definition: config::ModelDefinition = serde_yaml::from_str(yaml)?;
        definition.into_catalog()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entity(&self, name: &str) -> Result<&EntitySchema, ModelCatalogError> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelCatalogError::UnknownEntity(name.to_string()))
    }

    /// Indexed navigation lookup: `(entity, navigation) -> schema`.
    pub fn navigation(&self, entity: &str, navigation: &str) -> Option<&NavigationSchema> {
        self.entities.get(entity).and_then(|e| e.navigation(navigation))
    }

    /// Entities in declaration order.
    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.order.iter().filter_map(|n| self.entities.get(n))
    }

    fn validate(&self) -> Result<(), ModelCatalogError> {
        for entity in self.entities() {
            let mut seen_columns = HashMap::new();
            for column in &entity.columns {
                if seen_columns.insert(column.name.as_str(), ()).is_some() {
                    return Err(ModelCatalogError::DuplicateColumn {
                        entity: entity.name.clone(),
                        column: column.name.clone(),
                    });
                }
            }
            if entity.key.is_empty() {
                return Err(ModelCatalogError::EmptyKey(entity.name.clone()));
            }
            for key in &entity.key {
                if !entity.has_column(key) {
                    return Err(ModelCatalogError::UnknownColumn {
                        entity: entity.name.clone(),
                        column: key.clone(),
                    });
                }
            }
            let mut seen_navs = HashMap::new();
            for nav in &entity.navigations {
                if seen_navs.insert(nav.name.as_str(), ()).is_some() {
                    return Err(ModelCatalogError::DuplicateNavigation {
                        entity: entity.name.clone(),
                        navigation: nav.name.clone(),
                    });
                }
                if entity.has_column(&nav.name) {
                    return Err(ModelCatalogError::NavigationShadowsColumn {
                        entity: entity.name.clone(),
                        navigation: nav.name.clone(),
                    });
                }
                let target = self.entities.get(&nav.target_entity).ok_or_else(|| {
                    ModelCatalogError::UnknownTargetEntity {
                        entity: entity.name.clone(),
                        navigation: nav.name.clone(),
                        target: nav.target_entity.clone(),
                    }
                })?;
                if nav.source_key.len() != nav.target_key.len() || nav.source_key.is_empty() {
                    return Err(ModelCatalogError::KeyArityMismatch {
                        entity: entity.name.clone(),
                        navigation: nav.name.clone(),
                        source_keys: nav.source_key.len(),
                        target: nav.target_key.len(),
                    });
                }
                for column in &nav.source_key {
                    if !entity.has_column(column) {
                        return Err(ModelCatalogError::UnknownKeyColumn {
                            entity: entity.name.clone(),
                            navigation: nav.name.clone(),
                            owner: entity.name.clone(),
                            column: column.clone(),
                        });
                    }
                }
                for column in &nav.target_key {
                    if !target.has_column(column) {
                        return Err(ModelCatalogError::UnknownKeyColumn {
                            entity: entity.name.clone(),
                            navigation: nav.name.clone(),
                            owner: target.name.clone(),
                            column: column.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
        }
    }

    fn two_entity_model() -> Vec<EntitySchema> {
        vec![
            EntitySchema {
                name: "Customer".into(),
                schema: "dbo".into(),
                table: "Customers".into(),
                columns: vec![column("CustomerID"), column("City")],
                key: vec!["CustomerID".into()],
                navigations: vec![NavigationSchema {
                    name: "Orders".into(),
                    target_entity: "Order".into(),
                    kind: NavigationKind::Collection,
                    source_key: vec!["CustomerID".into()],
                    target_key: vec!["CustomerID".into()],
                }],
            },
            EntitySchema {
                name: "Order".into(),
                schema: "dbo".into(),
                table: "Orders".into(),
                columns: vec![column("OrderID"), column("CustomerID")],
                key: vec!["OrderID".into()],
                navigations: vec![],
            },
        ]
    }

    #[test]
    fn builds_and_indexes_valid_model() {
        let catalog = EntityCatalog::new("northwind", two_entity_model()).unwrap();
        assert_eq!(catalog.name(), "northwind");
        assert!(catalog.entity("Customer").is_ok());
        let nav = catalog.navigation("Customer", "Orders").unwrap();
        assert!(nav.kind.is_collection());
        assert_eq!(nav.target_entity, "Order");
    }

    #[test]
    fn rejects_dangling_navigation_target() {
        let mut entities = two_entity_model();
        entities.remove(1);
        let err = EntityCatalog::new("m", entities).unwrap_err();
        assert!(matches!(err, ModelCatalogError::UnknownTargetEntity { .. }));
    }

    #[test]
    fn rejects_unknown_key_column() {
        let mut entities = two_entity_model();
        entities[0].navigations[0].source_key = vec!["Nope".into()];
        let err = EntityCatalog::new("m", entities).unwrap_err();
        assert!(matches!(err, ModelCatalogError::UnknownKeyColumn { .. }));
    }

    #[test]
    fn rejects_key_arity_mismatch() {
        let mut entities = two_entity_model();
        entities[0].navigations[0].target_key =
            vec!["CustomerID".into(), "OrderID".into()];
        let err = EntityCatalog::new("m", entities).unwrap_err();
        assert!(matches!(err, ModelCatalogError::KeyArityMismatch { .. }));
    }

    #[test]
    fn rejects_entity_without_key() {
        let mut entities = two_entity_model();
        entities[1].key.clear();
        let err = EntityCatalog::new("m", entities).unwrap_err();
        assert_eq!(err, ModelCatalogError::EmptyKey("Order".into()));
    }
}
