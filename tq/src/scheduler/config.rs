//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::options::TaskDefaults;

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Max operations in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries allowed after the first failed attempt
    #[serde(default = "default_max_retries", rename = "max-retries")]
    pub max_retries: u32,

    /// Delay before a failed task is requeued, in milliseconds
    #[serde(default = "default_retry_delay_ms", rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Per-attempt timeout in milliseconds (none when absent)
    #[serde(default, rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    /// Default priority for new tasks
    #[serde(default, rename = "default-priority")]
    pub default_priority: i32,

    /// Poll interval used by `drain_and_wait`, in milliseconds
    #[serde(default = "default_drain_poll_ms", rename = "drain-poll-ms")]
    pub drain_poll_ms: u64,
}

fn default_concurrency() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_drain_poll_ms() -> u64 {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: None,
            default_priority: 0,
            drain_poll_ms: default_drain_poll_ms(),
        }
    }
}

impl SchedulerConfig {
    /// Config with the given concurrency and default task options
    pub fn with_concurrency(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> eyre::Result<()> {
        if self.concurrency == 0 {
            return Err(eyre::eyre!("Scheduler concurrency must be at least 1"));
        }
        if self.drain_poll_ms == 0 {
            return Err(eyre::eyre!("drain-poll-ms must be at least 1"));
        }
        Ok(())
    }

    /// Get the retry delay as a Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Get the task timeout as a Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Get the drain poll interval as a Duration
    pub fn drain_poll(&self) -> Duration {
        Duration::from_millis(self.drain_poll_ms)
    }

    /// Instance-level defaults that per-task options fall back to
    pub fn default_options(&self) -> TaskDefaults {
        TaskDefaults {
            max_retries: self.max_retries,
            retry_delay: self.retry_delay(),
            retry_if: None,
            timeout: self.timeout(),
            priority: self.default_priority,
        }
    }
}
