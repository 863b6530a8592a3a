//! # Lattice Cluster Core
//!
//! Cluster membership and topology for the Lattice data grid. The crate
//! owns what "the cluster" means at any instant: a discovery manager
//! over a pluggable transport, immutable per-version topology snapshots
//! with bounded history, a segmentation watchdog with a pluggable
//! recovery policy, the metrics provider feeding heartbeats, and the
//! single-shot futures used for topology awaits and job dispatch.
//!
//! ## Architecture
//!
//! ```text
//! transport thread              discovery worker           policy side
//! ----------------              ----------------           -----------
//! raw event callback   ---->    attribute checks           segmentation
//!  - alive-set rewind  queue    listener fan-out   ---->   watchdog /
//!  - snapshot install           event recording            reconnect
//!  - version advance            future completion          workers
//! ```
//!
//! The transport callback is short and non-blocking; everything that may
//! block runs on the discovery worker. Listener callbacks observe events
//! in enqueue order with the version stamped on each event.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cluster::{ClusterConfig, DiscoveryManager};
//!
//! let config = ClusterConfig::from_file("cluster.yaml")?;
//! let manager = DiscoveryManager::new(config, transport);
//! manager.start()?;
//!
//! let fut = manager.topology_future(3);
//! let reached = fut.get()?; // >= 3
//! ```

pub mod balancer;
pub mod config;
pub mod error;
pub mod events;
pub mod future;
pub mod hash;
pub mod history;
pub mod manager;
pub mod metrics;
pub mod policy;
pub mod pool;
pub mod segmentation;
pub mod snapshot;
pub mod transport;
pub mod worker;

pub use balancer::LoadBalancer;
pub use config::{ClusterConfig, WorkerPoolConfig};
pub use error::{ClusterError, Result};
pub use events::{EventLog, EventSink, NullEventSink};
pub use future::GridFuture;
pub use hash::topology_hash;
pub use history::TopologyHistory;
pub use manager::{DiscoveryManager, DiscoveryManagerBuilder, EventListener};
pub use metrics::{DefaultVmMetrics, MetricsProvider, VmMetricsSource};
pub use policy::{GridLifecycle, LoggingLifecycle, SegmentationPolicy};
pub use segmentation::{SegmentationResolver, SegmentationWatchdog, SegmentState};
pub use snapshot::TopologySnapshot;
pub use transport::{
    ComponentData, DataExchange, DiscoveryCallback, DiscoveryTransport, MetricsSource,
    RawDiscoveryEvent,
};
pub use worker::WorkerHandle;
pub use pool::WorkerPool;
