//! Metrics Provider
//!
//! Builds the [`NodeMetrics`] snapshot the transport includes in
//! heartbeats. Job counters are plain atomics; per-job wait/execute
//! samples go into sharded rings so concurrent job completions do not
//! contend on one lock. Samples age out by time and are bounded by the
//! configured history size.
//!
//! Process-level gauges (heap, threads, CPU load) come from a
//! [`VmMetricsSource`] the embedder supplies; the default source reports
//! only what the standard library can observe.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use types::{now_millis, NodeMetrics};

/// Process gauges the embedder can supply.
pub trait VmMetricsSource: Send + Sync {
    fn heap_used(&self) -> u64 {
        0
    }

    fn heap_committed(&self) -> u64 {
        0
    }

    fn heap_max(&self) -> u64 {
        0
    }

    fn thread_count(&self) -> u32 {
        0
    }

    /// `-1.0` when unavailable.
    fn cpu_load(&self) -> f64 {
        -1.0
    }
}

/// Source reporting only standard-library observable gauges.
#[derive(Debug, Default)]
pub struct DefaultVmMetrics;

impl VmMetricsSource for DefaultVmMetrics {
    fn thread_count(&self) -> u32 {
        std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy)]
struct JobSample {
    wait: Duration,
    execute: Duration,
    at: Instant,
}

#[derive(Debug, Default)]
struct JobShard {
    samples: VecDeque<JobSample>,
}

pub struct MetricsProvider {
    shards: Vec<Mutex<JobShard>>,
    per_shard_capacity: usize,
    expire: Duration,
    next_shard: AtomicUsize,

    active_jobs: AtomicI64,
    waiting_jobs: AtomicI64,
    executed_jobs: AtomicU64,
    cancelled_jobs: AtomicU64,
    rejected_jobs: AtomicU64,

    started_at: Instant,
    start_time_ms: u64,

    vm: Arc<dyn VmMetricsSource>,
}

impl MetricsProvider {
    pub fn new(
        concurrency_level: usize,
        history_size: usize,
        expire: Duration,
        vm: Arc<dyn VmMetricsSource>,
    ) -> Self {
        let shards = concurrency_level.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(JobShard::default())).collect(),
            per_shard_capacity: (history_size / shards).max(1),
            expire,
            next_shard: AtomicUsize::new(0),
            active_jobs: AtomicI64::new(0),
            waiting_jobs: AtomicI64::new(0),
            executed_jobs: AtomicU64::new(0),
            cancelled_jobs: AtomicU64::new(0),
            rejected_jobs: AtomicU64::new(0),
            started_at: Instant::now(),
            start_time_ms: now_millis(),
            vm,
        }
    }

    pub fn job_queued(&self) {
        self.waiting_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_started(&self) {
        self.waiting_jobs.fetch_sub(1, Ordering::Relaxed);
        self.active_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_finished(&self, waited: Duration, executed: Duration) {
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
        self.executed_jobs.fetch_add(1, Ordering::Relaxed);

        let idx = self.next_shard.fetch_add(1, Ordering::Relaxed) % self.shards.len();
        let mut shard = self.shards[idx].lock();
        shard.samples.push_back(JobSample {
            wait: waited,
            execute: executed,
            at: Instant::now(),
        });
        while shard.samples.len() > self.per_shard_capacity {
            shard.samples.pop_front();
        }
    }

    pub fn job_cancelled(&self) {
        self.active_jobs.fetch_sub(1, Ordering::Relaxed);
        self.cancelled_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_rejected(&self) {
        self.waiting_jobs.fetch_sub(1, Ordering::Relaxed);
        self.rejected_jobs.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current counters for a heartbeat.
    pub fn snapshot(&self) -> NodeMetrics {
        let now = Instant::now();
        let mut samples = 0u64;
        let mut wait_total = Duration::ZERO;
        let mut execute_total = Duration::ZERO;

        for shard in &self.shards {
            let mut shard = shard.lock();
            while let Some(front) = shard.samples.front() {
                if now.duration_since(front.at) > self.expire {
                    shard.samples.pop_front();
                } else {
                    break;
                }
            }
            for sample in &shard.samples {
                samples += 1;
                wait_total += sample.wait;
                execute_total += sample.execute;
            }
        }

        let avg_ms = |total: Duration| {
            if samples == 0 {
                0.0
            } else {
                total.as_secs_f64() * 1000.0 / samples as f64
            }
        };

        NodeMetrics {
            active_jobs: self.active_jobs.load(Ordering::Relaxed).max(0) as u32,
            waiting_jobs: self.waiting_jobs.load(Ordering::Relaxed).max(0) as u32,
            executed_jobs: self.executed_jobs.load(Ordering::Relaxed),
            cancelled_jobs: self.cancelled_jobs.load(Ordering::Relaxed),
            rejected_jobs: self.rejected_jobs.load(Ordering::Relaxed),
            avg_job_wait_ms: avg_ms(wait_total),
            avg_job_execute_ms: avg_ms(execute_total),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get() as u32)
                .unwrap_or(1),
            cpu_load: self.vm.cpu_load(),
            heap_used: self.vm.heap_used(),
            heap_committed: self.vm.heap_committed(),
            heap_max: self.vm.heap_max(),
            thread_count: self.vm.thread_count(),
            start_time: self.start_time_ms,
            up_time: self.started_at.elapsed().as_millis() as u64,
            last_update_time: now_millis(),
        }
    }
}

impl crate::transport::MetricsSource for MetricsProvider {
    fn metrics(&self) -> NodeMetrics {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn provider(history: usize, expire: Duration) -> MetricsProvider {
        MetricsProvider::new(4, history, expire, Arc::new(DefaultVmMetrics))
    }

    #[test]
    fn job_lifecycle_updates_counters() {
        let metrics = provider(64, Duration::from_secs(60));

        metrics.job_queued();
        metrics.job_queued();
        metrics.job_started();

        let snap = metrics.snapshot();
        assert_eq!(snap.waiting_jobs, 1);
        assert_eq!(snap.active_jobs, 1);

        metrics.job_finished(Duration::from_millis(10), Duration::from_millis(30));
        let snap = metrics.snapshot();
        assert_eq!(snap.active_jobs, 0);
        assert_eq!(snap.executed_jobs, 1);
        assert!(snap.avg_job_wait_ms > 0.0);
        assert!(snap.avg_job_execute_ms >= snap.avg_job_wait_ms);
    }

    #[test]
    fn history_is_bounded_per_shard() {
        let metrics = provider(4, Duration::from_secs(60));

        for _ in 0..100 {
            metrics.job_queued();
            metrics.job_started();
            metrics.job_finished(Duration::from_millis(1), Duration::from_millis(1));
        }

        // 4 shards, 1 sample each after the bound is applied.
        let snap = metrics.snapshot();
        assert_eq!(snap.executed_jobs, 100);
        assert!(snap.avg_job_execute_ms > 0.0);
    }

    #[test]
    fn expired_samples_drop_out_of_averages() {
        let metrics = provider(64, Duration::from_millis(10));

        metrics.job_queued();
        metrics.job_started();
        metrics.job_finished(Duration::from_millis(5), Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(30));

        let snap = metrics.snapshot();
        assert_eq!(snap.executed_jobs, 1);
        assert_eq!(snap.avg_job_execute_ms, 0.0);
    }

    #[test]
    fn rejected_jobs_leave_waiting_count() {
        let metrics = provider(64, Duration::from_secs(60));

        metrics.job_queued();
        metrics.job_rejected();

        let snap = metrics.snapshot();
        assert_eq!(snap.waiting_jobs, 0);
        assert_eq!(snap.rejected_jobs, 1);
    }
}
