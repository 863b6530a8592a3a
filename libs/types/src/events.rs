//! Cluster Events
//!
//! Typed events emitted by the discovery pipeline and the deployment
//! store. Event codes are stable integers shared across the cluster and
//! must never be renumbered.

use crate::node::GridNode;
use crate::now_millis;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::Arc;

/// Stable event type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum EventKind {
    NodeJoined = 10,
    NodeLeft = 11,
    NodeFailed = 12,
    NodeMetricsUpdated = 13,
    NodeSegmented = 14,
    NodeReconnected = 15,

    TaskDeployed = 16,
    TaskUndeployed = 17,
    TaskDeployFailed = 18,

    ClassDeployed = 20,
    ClassUndeployed = 21,
    ClassDeployFailed = 22,
}

impl EventKind {
    /// Membership events advance the topology version; metrics updates do
    /// not.
    pub fn is_membership(self) -> bool {
        matches!(
            self,
            EventKind::NodeJoined
                | EventKind::NodeLeft
                | EventKind::NodeFailed
                | EventKind::NodeReconnected
        )
    }

    pub fn is_discovery(self) -> bool {
        matches!(
            self,
            EventKind::NodeJoined
                | EventKind::NodeLeft
                | EventKind::NodeFailed
                | EventKind::NodeMetricsUpdated
                | EventKind::NodeSegmented
                | EventKind::NodeReconnected
        )
    }
}

/// A discovery-plane event: membership change, metrics heartbeat or
/// segmentation notice.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    pub kind: EventKind,
    /// Topology version the event was stamped with.
    pub topology_version: u64,
    /// Node the event is about.
    pub node: Arc<GridNode>,
    /// Top-level node list as of this event.
    pub topology: Vec<Arc<GridNode>>,
    /// Wall-clock milliseconds.
    pub timestamp: u64,
}

impl DiscoveryEvent {
    pub fn new(
        kind: EventKind,
        topology_version: u64,
        node: Arc<GridNode>,
        topology: Vec<Arc<GridNode>>,
    ) -> Self {
        Self {
            kind,
            topology_version,
            node,
            topology,
            timestamp: now_millis(),
        }
    }
}

/// A deployment-plane event: class/task deploy and undeploy outcomes.
#[derive(Debug, Clone)]
pub struct DeploymentEvent {
    pub kind: EventKind,
    pub alias: String,
    pub class_name: String,
    pub timestamp: u64,
}

impl DeploymentEvent {
    pub fn new(kind: EventKind, alias: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            kind,
            alias: alias.into(),
            class_name: class_name.into(),
            timestamp: now_millis(),
        }
    }
}

/// Any recorded cluster event.
#[derive(Debug, Clone)]
pub enum Event {
    Discovery(DiscoveryEvent),
    Deployment(DeploymentEvent),
}

/// Anything events can be recorded into; implemented by the cluster
/// event log and by test capture sinks.
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Discovery(e) => e.kind,
            Event::Deployment(e) => e.kind,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Event::Discovery(e) => e.timestamp,
            Event::Deployment(e) => e.timestamp,
        }
    }
}
