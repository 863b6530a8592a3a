//! Worker Pool
//!
//! Fixed-size thread pool over a crossbeam queue. The queue is unbounded
//! by default; configuring a bound switches submission to
//! abort-on-saturation, surfacing [`ClusterError::PoolSaturated`] to the
//! caller instead of blocking.

use crate::config::WorkerPoolConfig;
use crate::error::{ClusterError, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::thread::JoinHandle;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    capacity: Option<usize>,
}

impl WorkerPool {
    pub fn new(config: &WorkerPoolConfig) -> Self {
        let (tx, rx): (Sender<Job>, Receiver<Job>) = match config.queue_capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };

        let mut workers = Vec::with_capacity(config.core_pool_size);
        for idx in 0..config.core_pool_size {
            let rx = rx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("grid-pool-{}", idx))
                .spawn(move || {
                    // Drains until every sender is dropped.
                    for job in rx.iter() {
                        job();
                    }
                    debug!("pool worker exiting");
                })
                .expect("failed to spawn pool worker");
            workers.push(handle);
        }

        Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            capacity: config.queue_capacity,
        }
    }

    /// Submit a job. Fails with [`ClusterError::PoolSaturated`] when a
    /// bounded queue is full, [`ClusterError::ManagerStopped`] after
    /// shutdown.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(ClusterError::ManagerStopped);
        };

        match tx.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(capacity = ?self.capacity, "worker pool saturated, job rejected");
                Err(ClusterError::PoolSaturated {
                    capacity: self.capacity.unwrap_or(0),
                })
            }
            Err(TrySendError::Disconnected(_)) => Err(ClusterError::ManagerStopped),
        }
    }

    /// Drop the queue and wait for workers to drain. Idempotent.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn runs_submitted_jobs() {
        let pool = WorkerPool::new(&WorkerPoolConfig {
            core_pool_size: 2,
            queue_capacity: None,
        });

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn bounded_queue_aborts_on_saturation() {
        let pool = WorkerPool::new(&WorkerPoolConfig {
            core_pool_size: 1,
            queue_capacity: Some(1),
        });

        let (block_tx, block_rx) = crossbeam_channel::bounded::<()>(0);

        // Occupy the single worker.
        pool.submit(move || {
            let _ = block_rx.recv();
        })
        .unwrap();

        // Fill the queue, then overflow it.
        let mut saturated = false;
        for _ in 0..4 {
            if let Err(err) = pool.submit(|| {}) {
                assert_matches!(err, ClusterError::PoolSaturated { capacity: 1 });
                saturated = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(saturated, "expected a saturation rejection");

        block_tx.send(()).unwrap();
        pool.shutdown();
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = WorkerPool::new(&WorkerPoolConfig {
            core_pool_size: 1,
            queue_capacity: None,
        });
        pool.shutdown();

        assert_matches!(pool.submit(|| {}), Err(ClusterError::ManagerStopped));
    }
}
