//! YAML model definitions.
//!
//! A model file lists entities with their backing table, columns, key, and
//! navigations. Definitions are plain serde structs; [`ModelDefinition::into_catalog`]
//! converts them into the validated runtime [`EntityCatalog`].
//!
//! ```yaml
//! model: northwind
//! entities:
//!   - name: Customer
//!     table: Customers
//!     columns: [CustomerID, CompanyName, City]
//!     key: [CustomerID]
//!     navigations:
//!       - name: Orders
//!         target: Order
//!         kind: collection
//!         source_key: [CustomerID]
//!         target_key: [CustomerID]
//! ```

use serde::{Deserialize, Serialize};

use super::errors::ModelCatalogError;
use super::{ColumnSchema, EntityCatalog, EntitySchema, NavigationKind, NavigationSchema};

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_model_name() -> String {
    "model".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default = "default_model_name")]
    pub model: String,
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    /// Database schema; defaults to "dbo" when omitted.
    #[serde(default = "default_schema")]
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub key: Vec<String>,
    #[serde(default)]
    pub navigations: Vec<NavigationDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationDefinition {
    pub name: String,
    pub target: String,
    pub kind: NavigationKindDefinition,
    /// Only meaningful for references; collections ignore it.
    #[serde(default)]
    pub required: bool,
    pub source_key: Vec<String>,
    pub target_key: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationKindDefinition {
    Reference,
    Collection,
}

impl ModelDefinition {
    pub fn into_catalog(self) -> Result<EntityCatalog, ModelCatalogError> {
        let entities = self
            .entities
            .into_iter()
            .map(|e| {
                let navigations = e
                    .navigations
                    .into_iter()
                    .map(|n| NavigationSchema {
                        name: n.name,
                        target_entity: n.target,
                        kind: match n.kind {
                            NavigationKindDefinition::Reference => NavigationKind::Reference {
                                required: n.required,
                            },
                            NavigationKindDefinition::Collection => NavigationKind::Collection,
                        },
                        source_key: n.source_key,
                        target_key: n.target_key,
                    })
                    .collect();
                EntitySchema {
                    name: e.name,
                    schema: e.schema,
                    table: e.table,
                    columns: e.columns.into_iter().map(|name| ColumnSchema { name }).collect(),
                    key: e.key,
                    navigations,
                }
            })
            .collect();
        EntityCatalog::new(self.model, entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_YAML: &str = r#"
model: northwind
entities:
  - name: Customer
    table: Customers
    columns: [CustomerID, CompanyName, City]
    key: [CustomerID]
    navigations:
      - name: Orders
        target: Order
        kind: collection
        source_key: [CustomerID]
        target_key: [CustomerID]
  - name: Order
    schema: sales
    table: Orders
    columns: [OrderID, CustomerID, OrderDate]
    key: [OrderID]
    navigations:
      - name: Customer
        target: Customer
        kind: reference
        required: true
        source_key: [CustomerID]
        target_key: [CustomerID]
"#;

    #[test]
    fn parses_model_yaml() {
        let catalog = EntityCatalog::from_yaml(MODEL_YAML).unwrap();
        assert_eq!(catalog.name(), "northwind");
        let order = catalog.entity("Order").unwrap();
        assert_eq!(order.schema, "sales");
        assert!(catalog
            .navigation("Order", "Customer")
            .unwrap()
            .kind
            .is_required());
    }

    #[test]
    fn schema_defaults_to_dbo() {
        let catalog = EntityCatalog::from_yaml(MODEL_YAML).unwrap();
        assert_eq!(catalog.entity("Customer").unwrap().schema, "dbo");
    }

    #[test]
    fn rejects_unknown_kind() {
        let yaml = MODEL_YAML.replace("kind: collection", "kind: bag");
        let err = EntityCatalog::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ModelCatalogError::Config(_)));
    }

    #[test]
    fn validation_runs_after_parse() {
        let yaml = MODEL_YAML.replace("target: Order", "target: Invoice");
        let err = EntityCatalog::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ModelCatalogError::UnknownTargetEntity { .. }));
    }
}
