use hasura_infra_core::graph::GraphError;
use thiserror::Error;

use crate::config::ConfigError;

/// Declaration-time failure; nothing is emitted when a unit fails to build
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{boundary} references boundary '{referenced}' which is not declared yet")]
    UndeclaredBoundary { boundary: String, referenced: String },

    #[error("Data safety violation: {0}")]
    DataSafety(String),

    #[error("Invalid topology: {0}")]
    Validation(String),
}
