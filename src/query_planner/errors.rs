use thiserror::Error;

use crate::model_catalog::errors::ModelCatalogError;

/// Compilation failures. Translation is a pure function, so every error here is
/// synchronous, deterministic for a given request+catalog pair, and final — a
/// failed compilation yields no usable plan and is never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryPlannerError {
    #[error("Unknown navigation '{navigation}' on entity '{entity}' (in include path '{path}')")]
    UnknownNavigation {
        entity: String,
        navigation: String,
        path: String,
    },
    #[error("Include path '{path}' addresses non-navigable member '{member}' of entity '{entity}'")]
    InvalidPath {
        entity: String,
        member: String,
        path: String,
    },
    #[error("Projection cannot be reconciled with pending includes: {0}")]
    AmbiguousProjection(String),
    #[error("Unknown column '{column}' on entity '{entity}'")]
    UnknownColumn { entity: String, column: String },
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),
    #[error("Model catalog error: {0}")]
    Catalog(#[from] ModelCatalogError),
}
