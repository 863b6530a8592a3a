//! Job Balancer
//!
//! Picks the node a job should be dispatched to from a topology
//! snapshot: the alive non-daemon node with the smallest gossiped job
//! load, round-robin among ties so equally idle nodes share work.
//! Execution itself is the compute plane's concern; dispatch hands back
//! a future carrying the chosen node id.

use crate::error::{ClusterError, Result};
use crate::future::GridFuture;
use crate::pool::WorkerPool;
use crate::snapshot::TopologySnapshot;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use types::GridNode;
use uuid::Uuid;

#[derive(Default)]
pub struct LoadBalancer {
    round_robin: AtomicUsize,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The balanced node for the next job, `None` on an empty topology.
    pub fn pick(&self, snapshot: &TopologySnapshot) -> Option<Arc<GridNode>> {
        let candidates = snapshot.all_nodes(None);
        if candidates.is_empty() {
            return None;
        }

        let min_load = candidates
            .iter()
            .map(|n| n.metrics().current_load())
            .min()?;

        let least_loaded: Vec<&Arc<GridNode>> = candidates
            .iter()
            .filter(|n| n.metrics().current_load() == min_load)
            .collect();

        let idx = self.round_robin.fetch_add(1, Ordering::Relaxed) % least_loaded.len();
        let chosen = Arc::clone(least_loaded[idx]);

        debug!(node = %chosen.id(), load = min_load, "balanced node selected");
        Some(chosen)
    }

    /// Resolve the balanced node asynchronously on the grid pool.
    pub fn dispatch(
        self: &Arc<Self>,
        pool: &WorkerPool,
        snapshot: Arc<TopologySnapshot>,
    ) -> GridFuture<Uuid> {
        let fut: GridFuture<Uuid> = GridFuture::new();

        let balancer = Arc::clone(self);
        let completion = fut.clone();
        let submitted = pool.submit(move || {
            match balancer.pick(&snapshot) {
                Some(node) => completion.on_done(Ok(node.id())),
                None => completion.on_done(Err(ClusterError::NoBalancedNode)),
            };
        });

        if let Err(err) = submitted {
            fut.on_done(Err(err));
        }

        fut
    }

    /// Synchronous pick that surfaces the empty-topology case as an
    /// error.
    pub fn balanced_node(&self, snapshot: &TopologySnapshot) -> Result<Arc<GridNode>> {
        self.pick(snapshot).ok_or(ClusterError::NoBalancedNode)
    }
}
