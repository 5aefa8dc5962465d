use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelCatalogError {
    #[error("Duplicate entity '{0}' in model definition")]
    DuplicateEntity(String),
    #[error("Entity '{0}' not found in model catalog")]
    UnknownEntity(String),
    #[error("Entity '{entity}' declares duplicate column '{column}'")]
    DuplicateColumn { entity: String, column: String },
    #[error("Entity '{entity}' declares duplicate navigation '{navigation}'")]
    DuplicateNavigation { entity: String, navigation: String },
    #[error("Entity '{entity}' references unknown column '{column}'")]
    UnknownColumn { entity: String, column: String },
    #[error("Entity '{0}' declares no key columns")]
    EmptyKey(String),
    #[error("Navigation '{entity}.{navigation}' targets unknown entity '{target}'")]
    UnknownTargetEntity {
        entity: String,
        navigation: String,
        target: String,
    },
    #[error("Navigation '{entity}.{navigation}' key column '{column}' does not exist on '{owner}'")]
    UnknownKeyColumn {
        entity: String,
        navigation: String,
        owner: String,
        column: String,
    },
    #[error("Navigation '{entity}.{navigation}' has {source_keys} source key column(s) but {target} target key column(s)")]
    KeyArityMismatch {
        entity: String,
        navigation: String,
        source_keys: usize,
        target: usize,
    },
    #[error("Navigation '{entity}.{navigation}' shares its name with a column")]
    NavigationShadowsColumn { entity: String, navigation: String },
    #[error("Invalid model configuration: {0}")]
    Config(String),
}

impl From<serde_yaml::Error> for ModelCatalogError {
    fn from(err: serde_yaml::Error) -> Self {
        ModelCatalogError::Config(err.to_string())
    }
}
