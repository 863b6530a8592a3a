//! Discovery Transport Boundary
//!
//! The transport is the only cluster-wide boundary of the core: it
//! delivers raw membership events, answers liveness probes and carries
//! per-component payloads piggybacked on joins. Everything above it (the
//! discovery manager, snapshots, segmentation) is transport-agnostic.
//!
//! The raw event callback runs inline on the transport's own thread and
//! must stay short and non-blocking; the discovery manager only updates
//! versioned state there and defers listener dispatch to its worker.

use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use types::{EventKind, GridNode, NodeMetrics};
use uuid::Uuid;

/// Supplies the local metrics snapshot a transport includes in its
/// heartbeats.
pub trait MetricsSource: Send + Sync {
    fn metrics(&self) -> NodeMetrics;
}

/// Per-component payload exchanged once per join.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentData {
    /// Component the payload belongs to (e.g. `"deploy"`).
    pub component: String,
    pub payload: Vec<u8>,
}

/// Collects and applies per-component join data.
pub trait DataExchange: Send + Sync {
    /// Gather payloads to send to a joining node.
    fn collect(&self, node_id: Uuid) -> Vec<ComponentData>;

    /// Apply payloads received from the cluster on our own join.
    fn on_exchange(&self, data: Vec<ComponentData>);
}

/// A raw event as delivered by the transport.
#[derive(Clone)]
pub struct RawDiscoveryEvent {
    pub kind: EventKind,
    /// Version the transport stamped on the event. Strictly increasing
    /// for membership events when the transport supports node order.
    pub topology_version: u64,
    /// Node the event is about.
    pub node: Arc<GridNode>,
    /// Full top-level snapshot as of this event.
    pub snapshot: Vec<Arc<GridNode>>,
    /// Historical snapshots, when the transport supports history.
    pub history: Option<BTreeMap<u64, Vec<Arc<GridNode>>>>,
}

/// Callback installed by the discovery manager; runs on the transport
/// thread.
pub type DiscoveryCallback = Arc<dyn Fn(RawDiscoveryEvent) + Send + Sync>;

/// The pluggable membership transport.
pub trait DiscoveryTransport: Send + Sync {
    /// The local node. Stable for the lifetime of one connect session;
    /// replaced after a successful [`DiscoveryTransport::reconnect`].
    fn local_node(&self) -> Arc<GridNode>;

    fn remote_nodes(&self) -> Vec<Arc<GridNode>>;

    fn node(&self, id: Uuid) -> Option<Arc<GridNode>>;

    /// Direct liveness probe; authoritative over any cached view.
    fn ping_node(&self, id: Uuid) -> bool;

    /// When the first node of this cluster incarnation started,
    /// milliseconds since the Unix epoch.
    fn grid_start_time(&self) -> u64;

    /// Install or clear the raw event callback.
    fn set_listener(&self, callback: Option<DiscoveryCallback>);

    /// Install or clear the join data-exchange hooks.
    fn set_data_exchange(&self, exchange: Option<Arc<dyn DataExchange>>);

    /// Install or clear the heartbeat metrics source. Transports without
    /// heartbeats may ignore it.
    fn set_metrics_source(&self, _source: Option<Arc<dyn MetricsSource>>) {}

    /// Detach from the cluster without stopping the local process.
    fn disconnect(&self) -> Result<()>;

    /// Re-join the cluster after a segmentation-induced disconnect.
    fn reconnect(&self) -> Result<()>;

    /// Whether the transport guarantees a unique monotone order per node
    /// and `topology_version == node.order()` on joins.
    fn supports_node_order(&self) -> bool {
        false
    }

    /// Whether the transport delivers historical snapshots with events.
    fn supports_topology_history(&self) -> bool {
        false
    }
}
