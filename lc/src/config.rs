//! Load cache configuration

use serde::{Deserialize, Serialize};
use taskqueue::SchedulerConfig;

use crate::priority::PriorityRules;

/// Load cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadCacheConfig {
    /// Max loads in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retries after a failed load
    #[serde(default = "default_max_retries", rename = "max-retries")]
    pub max_retries: u32,

    /// Delay before a failed load is retried, in milliseconds
    #[serde(default = "default_retry_delay_ms", rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,

    /// Per-load timeout in milliseconds; timed-out loads are not retried
    #[serde(default, rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,

    #[serde(default)]
    pub priority: PriorityRules,
}

fn default_concurrency() -> usize {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for LoadCacheConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: None,
            priority: PriorityRules::default(),
        }
    }
}

impl LoadCacheConfig {
    /// Scheduler settings for the cache's own scheduler
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }
}
