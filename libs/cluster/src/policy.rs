//! Segmentation Policy Engine
//!
//! Applies the configured recovery policy when the local node segments.
//! Stop and restart actions always run on a fresh thread, never the
//! discovery worker (the worker would deadlock with transport shutdown);
//! reconnect is driven by a dedicated worker that re-validates the
//! segment, resets discovery state and re-joins through the transport.
//! A failed reconnect degrades to the stop path.

use crate::segmentation::SegmentState;
use crate::transport::DiscoveryTransport;
use crate::worker::WorkerHandle;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// What to do when the local node loses its segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationPolicy {
    /// Log and keep running.
    Noop,
    /// Disconnect the transport and stop the node.
    #[default]
    Stop,
    /// Disconnect the transport and request a host-process restart.
    RestartProcess,
    /// Disconnect, clear discovery state and re-join the cluster.
    Reconnect,
}

/// Node lifecycle actions the embedder provides.
pub trait GridLifecycle: Send + Sync {
    /// Stop the local node. `cancel` aborts in-flight work.
    fn stop_node(&self, cancel: bool);

    /// Restart the host process.
    fn restart_process(&self);
}

/// Default lifecycle that only logs the requested action.
#[derive(Debug, Default)]
pub struct LoggingLifecycle;

impl GridLifecycle for LoggingLifecycle {
    fn stop_node(&self, cancel: bool) {
        warn!(cancel, "node stop requested");
    }

    fn restart_process(&self) {
        warn!("process restart requested");
    }
}

/// Hooks the reconnect worker drives back into the discovery manager.
pub struct ReconnectHooks {
    /// Reset discovery state (topology version to 0, history cleared)
    /// before re-joining.
    pub before_reconnect: Box<dyn Fn() + Send + Sync>,
    /// Refresh the local node after a successful re-join.
    pub after_reconnect: Box<dyn Fn() + Send + Sync>,
}

pub struct PolicyEngine {
    policy: SegmentationPolicy,
    transport: Arc<dyn DiscoveryTransport>,
    lifecycle: Arc<dyn GridLifecycle>,
    reconnect_tx: Sender<()>,
    reconnect_worker: WorkerHandle,
}

impl PolicyEngine {
    pub fn new(
        policy: SegmentationPolicy,
        transport: Arc<dyn DiscoveryTransport>,
        lifecycle: Arc<dyn GridLifecycle>,
        seg_state: Arc<SegmentState>,
        hooks: ReconnectHooks,
    ) -> Self {
        let (tx, rx) = unbounded::<()>();

        let worker_transport = Arc::clone(&transport);
        let worker_lifecycle = Arc::clone(&lifecycle);

        let reconnect_worker = WorkerHandle::spawn("grid-reconnect", move |cancelled| {
            while !cancelled.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(()) => {}
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                if seg_state.has_resolvers() && !seg_state.await_valid(&cancelled) {
                    break;
                }

                (hooks.before_reconnect)();

                match worker_transport.reconnect() {
                    Ok(()) => {
                        (hooks.after_reconnect)();
                        info!("reconnected to cluster after segmentation");
                    }
                    Err(err) => {
                        error!(error = %err, "reconnect failed, stopping node");
                        let _ = worker_transport.disconnect();
                        worker_lifecycle.stop_node(true);
                    }
                }
            }
        });

        Self {
            policy,
            transport,
            lifecycle,
            reconnect_tx: tx,
            reconnect_worker,
        }
    }

    pub fn policy(&self) -> SegmentationPolicy {
        self.policy
    }

    /// Apply the configured policy. Called from the discovery worker;
    /// everything that could touch transport shutdown is handed off.
    pub fn on_segmented(&self) {
        warn!(policy = ?self.policy, "applying segmentation policy");

        match self.policy {
            SegmentationPolicy::Noop => {
                warn!("segmentation policy is NOOP, node keeps running in a lost segment");
            }
            SegmentationPolicy::Stop => {
                self.disconnect();
                let lifecycle = Arc::clone(&self.lifecycle);
                detached("segmentation-stop", move || lifecycle.stop_node(true));
            }
            SegmentationPolicy::RestartProcess => {
                self.disconnect();
                let lifecycle = Arc::clone(&self.lifecycle);
                detached("segmentation-restart", move || lifecycle.restart_process());
            }
            SegmentationPolicy::Reconnect => {
                self.disconnect();
                let _ = self.reconnect_tx.send(());
            }
        }
    }

    fn disconnect(&self) {
        if let Err(err) = self.transport.disconnect() {
            warn!(error = %err, "transport disconnect failed during segmentation");
        }
    }

    pub fn shutdown(&self) {
        self.reconnect_worker.join();
    }
}

/// Run a lifecycle action on a fresh named thread.
fn detached(name: &str, action: impl FnOnce() + Send + 'static) {
    if let Err(err) = std::thread::Builder::new()
        .name(name.to_string())
        .spawn(action)
    {
        error!(error = %err, thread = name, "failed to spawn lifecycle thread");
    }
}
