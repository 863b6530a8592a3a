//! Error types for the deployment store

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeployError>;

#[derive(Error, Debug, Clone)]
pub enum DeployError {
    #[error("Alias '{alias}' is already owned by another live deployment")]
    AliasConflict { alias: String },

    #[error("Failed to register class '{class_name}': {message}")]
    Registration { class_name: String, message: String },

    #[error("Class '{class_name}' not found by the supplied loader")]
    ClassNotFound { class_name: String },

    #[error("Requesting node {node_id} is not alive")]
    SenderNotAlive { node_id: String },
}
