use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid shutdown policy: {0} (expected \"graceful\" or \"immediate\")")]
    ShutdownPolicy(String),

    #[error("invalid worker thread count: {0}")]
    WorkerThreads(String),
}

/// What happens to queued work when the worker pool shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Queued and in-flight tasks run to completion.
    #[default]
    Graceful,
    /// In-flight tasks finish; queued tasks are abandoned.
    Immediate,
}

impl FromStr for ShutdownPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "graceful" => Ok(ShutdownPolicy::Graceful),
            "immediate" => Ok(ShutdownPolicy::Immediate),
            other => Err(ConfigError::ShutdownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPolicy::Graceful => f.write_str("graceful"),
            ShutdownPolicy::Immediate => f.write_str("immediate"),
        }
    }
}

/// Scheduler configuration, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of worker threads. 0 = available parallelism.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Policy applied by `shutdown()`.
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,
    /// Worker threads are named `{prefix}-{index}`.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,
}

fn default_worker_threads() -> usize {
    4
}

fn default_thread_name_prefix() -> String {
    "tasker-worker".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            shutdown_policy: ShutdownPolicy::default(),
            thread_name_prefix: default_thread_name_prefix(),
        }
    }
}

impl SchedulerConfig {
    /// Config with a fixed worker count and defaults for everything else.
    pub fn with_workers(worker_threads: usize) -> Self {
        Self {
            worker_threads,
            ..Self::default()
        }
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            "Scheduler config: workers={}, shutdown_policy={}, thread_prefix={}",
            self.resolved_worker_threads(),
            self.shutdown_policy,
            self.thread_name_prefix
        );
    }
}
