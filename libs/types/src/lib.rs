//! # Lattice Shared Types
//!
//! Shared type definitions for the Lattice data grid: node identity,
//! node attributes, cache participation flags, product versions, cluster
//! events and the metrics snapshots nodes gossip in heartbeats.
//!
//! ## Design Philosophy
//!
//! - **Immutable identity**: a [`GridNode`] never changes once observed in
//!   a topology; only its metrics slot is refreshed in place.
//! - **Typed attributes**: node attributes are read through typed
//!   accessors that return `Option`; an unknown key is absent, never an
//!   error.
//! - **Stable event codes**: [`EventKind`] discriminants are part of the
//!   cluster protocol and never renumbered.

pub mod attributes;
pub mod cache;
pub mod events;
pub mod metrics;
pub mod node;
pub mod version;

pub use attributes::{attr_keys, AttributeValue, NodeAttributes};
pub use cache::{CacheAttributes, CacheName};
pub use events::{DeploymentEvent, DiscoveryEvent, Event, EventKind, EventSink};
pub use metrics::NodeMetrics;
pub use node::GridNode;
pub use version::ProductVersion;

/// Wall-clock milliseconds since the Unix epoch, used to stamp events and
/// metrics snapshots.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
