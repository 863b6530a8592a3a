//! Cluster Configuration
//!
//! YAML-loadable configuration for the membership core with validation
//! and `${VAR}` / `${VAR:default}` environment substitution. Segmentation
//! resolvers are runtime objects and are attached programmatically after
//! deserialization.

use crate::error::{ClusterError, Result};
use crate::events::DFLT_EVENT_LOG_CAPACITY;
use crate::history::DFLT_HISTORY_SIZE;
use crate::policy::SegmentationPolicy;
use crate::segmentation::SegmentationResolver;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const DFLT_SEGMENT_CHECK_FREQUENCY_MS: i64 = 10_000;
pub const DFLT_METRICS_HISTORY_SIZE: usize = 10_000;
pub const DFLT_METRICS_EXPIRE_TIME_MS: u64 = 600_000;
pub const DFLT_JOBS_METRICS_CONCURRENCY: usize = 64;
pub const DFLT_CORE_POOL_SIZE: usize = 100;

/// Recommended lower bound for periodic segment checks; lower values are
/// accepted with a warning.
pub const MIN_RECOMMENDED_SEGMENT_CHECK_MS: i64 = 2_000;

/// Worker pool sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_core_pool_size")]
    pub core_pool_size: usize,
    /// `None` keeps the queue unbounded; a bound switches submission to
    /// abort-on-saturation.
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

fn default_core_pool_size() -> usize {
    DFLT_CORE_POOL_SIZE
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            core_pool_size: DFLT_CORE_POOL_SIZE,
            queue_capacity: None,
        }
    }
}

/// Complete configuration of the membership/topology core.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Period between segment re-checks; `0` disables the periodic check,
    /// negative values are rejected.
    #[serde(default = "default_segment_check_frequency")]
    pub segment_check_frequency_ms: i64,

    /// Block at start until the segment becomes valid instead of failing.
    #[serde(default)]
    pub wait_for_segment_on_start: bool,

    #[serde(default)]
    pub segmentation_policy: SegmentationPolicy,

    #[serde(default = "default_metrics_history_size")]
    pub metrics_history_size: usize,

    #[serde(default = "default_metrics_expire_time")]
    pub metrics_expire_time_ms: u64,

    #[serde(default = "default_jobs_metrics_concurrency")]
    pub jobs_metrics_concurrency_level: usize,

    #[serde(default = "default_discovery_history_size")]
    pub discovery_history_size: usize,

    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,

    #[serde(default)]
    pub worker_pool: WorkerPoolConfig,

    /// Attached programmatically; an empty list disables segmentation.
    #[serde(skip)]
    pub segmentation_resolvers: Vec<Arc<dyn SegmentationResolver>>,
}

fn default_segment_check_frequency() -> i64 {
    DFLT_SEGMENT_CHECK_FREQUENCY_MS
}

fn default_metrics_history_size() -> usize {
    DFLT_METRICS_HISTORY_SIZE
}

fn default_metrics_expire_time() -> u64 {
    DFLT_METRICS_EXPIRE_TIME_MS
}

fn default_jobs_metrics_concurrency() -> usize {
    DFLT_JOBS_METRICS_CONCURRENCY
}

fn default_discovery_history_size() -> usize {
    DFLT_HISTORY_SIZE
}

fn default_event_log_capacity() -> usize {
    DFLT_EVENT_LOG_CAPACITY
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            segment_check_frequency_ms: DFLT_SEGMENT_CHECK_FREQUENCY_MS,
            wait_for_segment_on_start: false,
            segmentation_policy: SegmentationPolicy::default(),
            metrics_history_size: DFLT_METRICS_HISTORY_SIZE,
            metrics_expire_time_ms: DFLT_METRICS_EXPIRE_TIME_MS,
            jobs_metrics_concurrency_level: DFLT_JOBS_METRICS_CONCURRENCY,
            discovery_history_size: DFLT_HISTORY_SIZE,
            event_log_capacity: DFLT_EVENT_LOG_CAPACITY,
            worker_pool: WorkerPoolConfig::default(),
            segmentation_resolvers: Vec::new(),
        }
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("segment_check_frequency_ms", &self.segment_check_frequency_ms)
            .field("wait_for_segment_on_start", &self.wait_for_segment_on_start)
            .field("segmentation_policy", &self.segmentation_policy)
            .field("metrics_history_size", &self.metrics_history_size)
            .field("metrics_expire_time_ms", &self.metrics_expire_time_ms)
            .field(
                "jobs_metrics_concurrency_level",
                &self.jobs_metrics_concurrency_level,
            )
            .field("discovery_history_size", &self.discovery_history_size)
            .field("event_log_capacity", &self.event_log_capacity)
            .field("worker_pool", &self.worker_pool)
            .field(
                "segmentation_resolvers",
                &self.segmentation_resolvers.len(),
            )
            .finish()
    }
}

impl ClusterConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string, expanding `${VAR}` and
    /// `${VAR:default}` references first.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(yaml)?;
        let config: ClusterConfig = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Attach segmentation resolvers after deserialization.
    pub fn with_resolvers(mut self, resolvers: Vec<Arc<dyn SegmentationResolver>>) -> Self {
        self.segmentation_resolvers = resolvers;
        self
    }

    /// Whether the segmentation watchdog runs at all.
    pub fn segmentation_enabled(&self) -> bool {
        !self.segmentation_resolvers.is_empty()
    }

    pub fn segment_check_frequency(&self) -> Duration {
        Duration::from_millis(self.segment_check_frequency_ms.max(0) as u64)
    }

    pub fn metrics_expire_time(&self) -> Duration {
        Duration::from_millis(self.metrics_expire_time_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.segment_check_frequency_ms < 0 {
            return Err(ClusterError::Config {
                message: format!(
                    "segment_check_frequency_ms must be >= 0, got {}",
                    self.segment_check_frequency_ms
                ),
            });
        }

        if self.segment_check_frequency_ms > 0
            && self.segment_check_frequency_ms < MIN_RECOMMENDED_SEGMENT_CHECK_MS
        {
            warn!(
                frequency_ms = self.segment_check_frequency_ms,
                "segment check frequency below the recommended {} ms",
                MIN_RECOMMENDED_SEGMENT_CHECK_MS
            );
        }

        if self.metrics_history_size == 0 {
            return Err(ClusterError::Config {
                message: "metrics_history_size must be > 0".to_string(),
            });
        }

        if self.metrics_expire_time_ms == 0 {
            return Err(ClusterError::Config {
                message: "metrics_expire_time_ms must be > 0".to_string(),
            });
        }

        if self.jobs_metrics_concurrency_level == 0 {
            return Err(ClusterError::Config {
                message: "jobs_metrics_concurrency_level must be >= 1".to_string(),
            });
        }

        if self.discovery_history_size == 0 {
            return Err(ClusterError::Config {
                message: "discovery_history_size must be > 0".to_string(),
            });
        }

        if self.worker_pool.core_pool_size == 0 {
            return Err(ClusterError::Config {
                message: "worker_pool.core_pool_size must be >= 1".to_string(),
            });
        }

        Ok(())
    }

    /// Environment variable substitution.
    fn expand_env_vars(yaml: &str) -> Result<String> {
        let mut result = yaml.to_string();

        let env_var_regex = regex::Regex::new(r"\$\{([^}:]+)(?::([^}]*))?\}").map_err(|e| {
            ClusterError::Config {
                message: format!("Invalid environment variable pattern: {}", e),
            }
        })?;

        for captures in env_var_regex.captures_iter(yaml) {
            let full_match = captures.get(0).map(|m| m.as_str()).unwrap_or_default();
            let var_name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            let default_value = captures.get(2).map(|m| m.as_str()).unwrap_or("");

            let replacement = std::env::var(var_name).unwrap_or_else(|_| default_value.to_string());

            result = result.replace(full_match, &replacement);
        }

        Ok(result)
    }
}
