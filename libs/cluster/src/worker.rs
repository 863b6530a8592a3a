//! Worker Harness
//!
//! Named single-consumer worker threads with cooperative cancellation.
//! Workers poll their cancelled flag between dequeues; cancellation never
//! interrupts a running body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Handle to a spawned worker thread.
pub struct WorkerHandle {
    name: String,
    cancelled: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Spawn a named worker. The body receives the cancelled flag and is
    /// expected to return promptly once it flips.
    pub fn spawn(
        name: impl Into<String>,
        body: impl FnOnce(Arc<AtomicBool>) + Send + 'static,
    ) -> Self {
        let name = name.into();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                debug!(worker = %thread_name, "worker started");
                body(flag);
                debug!(worker = %thread_name, "worker finished");
            })
            .expect("failed to spawn worker thread");

        Self {
            name,
            cancelled,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cooperative shutdown.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Cancel and wait for the thread to exit. Idempotent.
    pub fn join(&self) {
        self.cancel();
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                info!(worker = %self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
