//! Resource Loader Boundary
//!
//! The deployment store does not load code itself; it keys deployments
//! by the loader that can. Loaders are compared by object identity: two
//! `Arc`s to the same loader mean the same code origin. A peer loader
//! fetches classes from a remote node and delegates to the originating
//! loader as its parent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How deployed classes are isolated between tasks and nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// Every deployment gets its own loader; no sharing.
    Private,
    /// Sharing within one master node's deployments only.
    Isolated,
    /// Classes shared across tasks from the same master.
    #[default]
    Shared,
    /// Like shared, but deployments survive master departure.
    Continuous,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentMode::Private => "PRIVATE",
            DeploymentMode::Isolated => "ISOLATED",
            DeploymentMode::Shared => "SHARED",
            DeploymentMode::Continuous => "CONTINUOUS",
        };
        f.write_str(s)
    }
}

/// Metadata for one loadable class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMeta {
    pub name: String,
    /// Whether the class is a compute task (drives the event taxonomy).
    pub task: bool,
}

impl ClassMeta {
    pub fn new(name: impl Into<String>, task: bool) -> Self {
        Self {
            name: name.into(),
            task,
        }
    }
}

/// Loads class metadata for a code origin.
pub trait ResourceLoader: Send + Sync {
    fn load_class(&self, name: &str) -> Option<ClassMeta>;

    /// Whether this loader fetches classes from a remote peer.
    fn is_peer_loader(&self) -> bool {
        false
    }

    /// The originating loader a peer loader delegates to.
    fn parent(&self) -> Option<Arc<dyn ResourceLoader>> {
        None
    }
}

/// Loader identity is object identity.
pub fn same_loader(a: &Arc<dyn ResourceLoader>, b: &Arc<dyn ResourceLoader>) -> bool {
    Arc::ptr_eq(a, b)
}

/// A deployment request: what the caller needs resolved and with which
/// loader, plus the requesting node for peer lookups.
pub struct DeploymentRequest {
    pub alias: String,
    pub class_name: String,
    /// Requesting node for peer lookups; checked against the live
    /// topology.
    pub sender_id: Option<Uuid>,
    /// Caller's loader for auto-deployment; the store falls back to the
    /// grid system loader when absent.
    pub loader: Option<Arc<dyn ResourceLoader>>,
}

impl DeploymentRequest {
    pub fn local(alias: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            class_name: class_name.into(),
            sender_id: None,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ResourceLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn from_sender(mut self, sender_id: Uuid) -> Self {
        self.sender_id = Some(sender_id);
        self
    }
}

/// Classes from the standard library or the grid's own namespace deploy
/// silently.
pub fn is_system_class(name: &str) -> bool {
    const SYSTEM_PREFIXES: [&str; 4] = ["std::", "core::", "alloc::", "lattice::"];
    SYSTEM_PREFIXES.iter().any(|p| name.starts_with(p))
}
