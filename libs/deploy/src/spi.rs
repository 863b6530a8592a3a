//! Deployment SPI and Topology Boundaries
//!
//! The store delegates resource registration and lookup to an SPI and
//! consults the live topology through a narrow view. Both are injected
//! handles; the store owns neither the SPI's registry nor the discovery
//! manager behind the view.

use crate::error::Result;
use crate::loader::{ClassMeta, ResourceLoader};
use std::sync::Arc;
use types::GridNode;
use uuid::Uuid;

/// A resource the SPI resolved for an alias.
#[derive(Clone)]
pub struct ResourceMeta {
    pub class_name: String,
    pub alias: String,
    pub task: bool,
    pub loader: Arc<dyn ResourceLoader>,
}

/// Registration and lookup of deployable resources.
pub trait DeploymentSpi: Send + Sync {
    /// Register a class under its loader; `Ok(true)` when newly
    /// registered, `Ok(false)` when already known.
    fn register(&self, loader: &Arc<dyn ResourceLoader>, class: &ClassMeta) -> Result<bool>;

    /// Resolve an alias to a registered resource.
    fn find_resource(&self, alias: &str) -> Option<ResourceMeta>;

    /// Release SPI-held state for an undeployed loader.
    fn on_released(&self, loader: &Arc<dyn ResourceLoader>);
}

/// The slice of the live topology the store needs.
pub trait TopologyView: Send + Sync {
    fn alive(&self, id: Uuid) -> bool;

    fn node(&self, id: Uuid) -> Option<Arc<GridNode>>;
}

/// View for single-node and test setups: every id is dead except its
/// own.
pub struct LocalOnlyTopology {
    local_id: Uuid,
}

impl LocalOnlyTopology {
    pub fn new(local_id: Uuid) -> Self {
        Self { local_id }
    }
}

impl TopologyView for LocalOnlyTopology {
    fn alive(&self, id: Uuid) -> bool {
        id == self.local_id
    }

    fn node(&self, _id: Uuid) -> Option<Arc<GridNode>> {
        None
    }
}
