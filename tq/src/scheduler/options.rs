//! Per-task options and their resolution against scheduler defaults

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::TaskError;

/// Decides whether a failed attempt may be retried
pub type RetryPredicate = Arc<dyn Fn(&TaskError) -> bool + Send + Sync>;

/// Instance-level defaults applied to every submission
#[derive(Clone)]
pub struct TaskDefaults {
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Used by tasks that set no predicate of their own; none retries every failure
    pub retry_if: Option<RetryPredicate>,
    pub timeout: Option<Duration>,
    pub priority: i32,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            retry_if: None,
            timeout: None,
            priority: 0,
        }
    }
}

impl TaskDefaults {
    /// Set the default retry predicate
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }
}

impl fmt::Debug for TaskDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefaults")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Options for one submission; every field falls back to the scheduler default
#[derive(Clone, Default)]
pub struct TaskOptions {
    pub max_retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub retry_if: Option<RetryPredicate>,
    pub timeout: Option<Duration>,
    pub priority: Option<i32>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Only retry failures for which `predicate` returns true
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&TaskError) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Some(Arc::new(predicate));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Fill unset fields from `defaults`
    pub(crate) fn resolve(self, defaults: &TaskDefaults) -> TaskPolicy {
        TaskPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_delay: self.retry_delay.unwrap_or(defaults.retry_delay),
            retry_if: self.retry_if.or_else(|| defaults.retry_if.clone()),
            timeout: self.timeout.or(defaults.timeout),
            priority: self.priority.unwrap_or(defaults.priority),
        }
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("retry_if", &self.retry_if.as_ref().map(|_| "<predicate>"))
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Fully resolved options carried by a task record
#[derive(Clone)]
pub(crate) struct TaskPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    retry_if: Option<RetryPredicate>,
    pub timeout: Option<Duration>,
    pub priority: i32,
}

impl TaskPolicy {
    /// Retry decision after `attempts` failures ending in `error`.
    ///
    /// Cancellation and shutdown are never retried, whatever the predicate says.
    pub fn should_retry(&self, cancelled: bool, attempts: u32, error: &TaskError) -> bool {
        !cancelled
            && attempts <= self.max_retries
            && error.is_retryable()
            && self.retry_if.as_ref().is_none_or(|pred| pred(error))
    }
}

impl fmt::Debug for TaskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPolicy")
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("timeout", &self.timeout)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
