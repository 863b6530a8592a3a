//! Node Metrics Snapshots
//!
//! Point-in-time counters a node includes in its discovery heartbeats.
//! Snapshots are plain data; aggregation and expiry live in the cluster
//! crate's metrics provider.

use serde::{Deserialize, Serialize};

/// Metrics a node gossips to the rest of the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Jobs currently executing on the node.
    pub active_jobs: u32,
    /// Jobs queued on the node, not yet started.
    pub waiting_jobs: u32,
    /// Jobs finished since node start.
    pub executed_jobs: u64,
    /// Jobs cancelled since node start.
    pub cancelled_jobs: u64,
    /// Jobs rejected by the pool since node start.
    pub rejected_jobs: u64,

    /// Average time a job spent queued, in milliseconds.
    pub avg_job_wait_ms: f64,
    /// Average job execution time, in milliseconds.
    pub avg_job_execute_ms: f64,

    pub cpu_count: u32,
    /// Load average over the sampling window, `-1.0` when unavailable.
    pub cpu_load: f64,

    pub heap_used: u64,
    pub heap_committed: u64,
    pub heap_max: u64,

    pub thread_count: u32,

    /// Node process start, milliseconds since the Unix epoch.
    pub start_time: u64,
    /// Milliseconds the node has been up.
    pub up_time: u64,
    /// When this snapshot was taken, milliseconds since the Unix epoch.
    pub last_update_time: u64,
}

impl NodeMetrics {
    /// Total jobs the node currently holds, queued or running.
    pub fn current_load(&self) -> u64 {
        self.active_jobs as u64 + self.waiting_jobs as u64
    }
}
