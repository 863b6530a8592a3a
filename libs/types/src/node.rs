//! Cluster Node Identity
//!
//! A [`GridNode`] is the immutable record of one member of the cluster:
//! stable id, join order, addresses, attribute map, daemon flag and
//! software version. Only the metrics slot mutates, refreshed in place
//! when a heartbeat arrives, so a single `Arc<GridNode>` can be shared
//! across every topology snapshot that observed the node.

use crate::attributes::NodeAttributes;
use crate::cache::CacheAttributes;
use crate::metrics::NodeMetrics;
use crate::version::ProductVersion;
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// One member of the cluster.
#[derive(Debug)]
pub struct GridNode {
    id: Uuid,
    /// Monotone per-cluster join order, assigned on first join, never
    /// reused. Doubles as the topology version of the join event when the
    /// transport supports ordering.
    order: u64,
    addresses: Vec<String>,
    attributes: NodeAttributes,
    cache_attributes: Vec<CacheAttributes>,
    daemon: bool,
    version: ProductVersion,
    metrics: RwLock<NodeMetrics>,
}

impl GridNode {
    pub fn new(id: Uuid, order: u64, version: ProductVersion) -> Self {
        Self {
            id,
            order,
            addresses: Vec::new(),
            attributes: NodeAttributes::new(),
            cache_attributes: Vec::new(),
            daemon: false,
            version,
            metrics: RwLock::new(NodeMetrics::default()),
        }
    }

    pub fn with_addresses(mut self, addresses: Vec<String>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn with_attributes(mut self, attributes: NodeAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_cache_attributes(mut self, cache_attributes: Vec<CacheAttributes>) -> Self {
        self.cache_attributes = cache_attributes;
        self
    }

    pub fn with_daemon(mut self, daemon: bool) -> Self {
        self.daemon = daemon;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn attributes(&self) -> &NodeAttributes {
        &self.attributes
    }

    pub fn cache_attributes(&self) -> &[CacheAttributes] {
        &self.cache_attributes
    }

    /// Daemon nodes ride the transport but are excluded from normal
    /// topology views.
    pub fn is_daemon(&self) -> bool {
        self.daemon
    }

    pub fn version(&self) -> ProductVersion {
        self.version
    }

    /// Latest gossiped metrics snapshot.
    pub fn metrics(&self) -> NodeMetrics {
        self.metrics.read().clone()
    }

    /// Install a fresh heartbeat snapshot. Identity fields never change.
    pub fn update_metrics(&self, metrics: NodeMetrics) {
        *self.metrics.write() = metrics;
    }
}

impl PartialEq for GridNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for GridNode {}

impl Hash for GridNode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for GridNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GridNode [id={}, order={}, daemon={}, ver={}]",
            self.id, self.order, self.daemon, self.version
        )
    }
}
