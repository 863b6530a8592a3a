//! Segmentation Watchdog
//!
//! Periodically validates that the local node still belongs to a
//! legitimate network segment. Resolvers are pluggable; a node with no
//! resolvers configured never segments. The watchdog is a single worker
//! consuming a small request queue: explicit re-check requests (fired on
//! node leave/fail) are coalesced with the periodic timer.
//!
//! Once a check turns invalid the watchdog stops probing until it is
//! re-armed by a reconnect, so segmentation escalates exactly once.

use crate::worker::WorkerHandle;
use crossbeam_channel::{unbounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long one watchdog iteration blocks for an explicit request.
const REQUEST_WAIT: Duration = Duration::from_secs(2);

/// Retry pause while blocking for a valid segment at start or reconnect.
pub const SEGMENT_RETRY_PAUSE: Duration = Duration::from_secs(2);

/// Answers whether the local node currently sees its legitimate segment.
pub trait SegmentationResolver: Send + Sync {
    /// `Ok(false)` means the segment is lost; an `Err` is treated as lost
    /// and logged.
    fn is_valid_segment(&self) -> Result<bool, String>;

    fn name(&self) -> &str {
        "resolver"
    }
}

/// Shared segment-check state: the resolver set and the last result.
pub struct SegmentState {
    resolvers: Vec<Arc<dyn SegmentationResolver>>,
    /// Last observed check result; `false` suppresses further probing
    /// until re-armed.
    last_valid: AtomicBool,
}

impl SegmentState {
    pub fn new(resolvers: Vec<Arc<dyn SegmentationResolver>>) -> Self {
        Self {
            resolvers,
            last_valid: AtomicBool::new(true),
        }
    }

    pub fn has_resolvers(&self) -> bool {
        !self.resolvers.is_empty()
    }

    pub fn last_valid(&self) -> bool {
        self.last_valid.load(Ordering::SeqCst)
    }

    /// Restore the valid state after a successful reconnect.
    pub fn re_arm(&self) {
        self.last_valid.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_invalid(&self) {
        self.last_valid.store(false, Ordering::SeqCst);
    }

    /// Sweep every resolver. A node with no resolvers is always valid.
    pub fn check_segment(&self) -> bool {
        for resolver in &self.resolvers {
            match resolver.is_valid_segment() {
                Ok(true) => {}
                Ok(false) => {
                    warn!(resolver = resolver.name(), "segment reported invalid");
                    return false;
                }
                Err(message) => {
                    error!(
                        resolver = resolver.name(),
                        %message,
                        "segment check failed, treating segment as lost"
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Block until the segment is valid, polling every
    /// [`SEGMENT_RETRY_PAUSE`]. Returns `false` when `cancelled` flips
    /// first.
    pub fn await_valid(&self, cancelled: &AtomicBool) -> bool {
        loop {
            if self.check_segment() {
                return true;
            }
            if cancelled.load(Ordering::SeqCst) {
                return false;
            }
            info!("waiting for valid segment");
            std::thread::sleep(SEGMENT_RETRY_PAUSE);
        }
    }
}

/// The periodic watchdog worker.
pub struct SegmentationWatchdog {
    requests: Sender<()>,
    worker: WorkerHandle,
}

impl SegmentationWatchdog {
    /// Spawn the watchdog. `frequency` must be non-zero (the caller
    /// disables the watchdog otherwise); `on_segmented` fires once per
    /// detected segmentation.
    pub fn start(
        state: Arc<SegmentState>,
        frequency: Duration,
        on_segmented: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let (tx, rx) = unbounded::<()>();

        let worker = WorkerHandle::spawn("segmentation-watchdog", move |cancelled| {
            let mut last_check = Instant::now();

            while !cancelled.load(Ordering::SeqCst) {
                let explicit = match rx.recv_timeout(REQUEST_WAIT) {
                    Ok(()) => true,
                    Err(RecvTimeoutError::Timeout) => false,
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                if !explicit && last_check.elapsed() < frequency {
                    continue;
                }

                // Coalesce queued requests into one sweep.
                while rx.try_recv().is_ok() {}

                last_check = Instant::now();

                if !state.last_valid() {
                    // Already segmented; stay quiet until re-armed.
                    continue;
                }

                if !state.check_segment() {
                    state.mark_invalid();
                    warn!("local node segmented");
                    on_segmented();
                } else {
                    debug!("segment check passed");
                }
            }
        });

        Self {
            requests: tx,
            worker,
        }
    }

    /// Ask for an immediate re-check (fired on node leave/fail).
    pub fn request_check(&self) {
        let _ = self.requests.send(());
    }

    pub fn stop(&self) {
        self.worker.join();
    }
}
