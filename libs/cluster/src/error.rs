//! Error types for the cluster core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClusterError>;

#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Discovery transport error: {message}")]
    Transport { message: String },

    #[error("Attribute '{attribute}' mismatch with node {remote_id}: local '{local}', remote '{remote}'")]
    AttributeMismatch {
        attribute: String,
        remote_id: String,
        local: String,
        remote: String,
    },

    #[error("No topology snapshot available for version {requested}")]
    TopologyHistoryMiss { requested: u64 },

    #[error("Future timed out after {after_ms} ms")]
    FutureTimeout { after_ms: u64 },

    #[error("Worker pool saturated at capacity {capacity}")]
    PoolSaturated { capacity: usize },

    #[error("Local node is not in a valid segment")]
    InvalidSegment,

    #[error("Segmentation check failed: {message}")]
    SegmentCheckFailed { message: String },

    #[error("No balanced node available for dispatch")]
    NoBalancedNode,

    #[error("Discovery manager is stopped")]
    ManagerStopped,

    #[error("YAML parsing error: {0}")]
    YamlParse(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<serde_yaml::Error> for ClusterError {
    fn from(e: serde_yaml::Error) -> Self {
        ClusterError::YamlParse(e.to_string())
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(e: std::io::Error) -> Self {
        ClusterError::Io(e.to_string())
    }
}
