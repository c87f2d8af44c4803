//! Errors surfaced through task handles and error listeners

use std::time::Duration;

use thiserror::Error;

/// Why a task attempt (or the task as a whole) failed
#[derive(Debug, Error)]
pub enum TaskError {
    /// The submitted operation returned an error
    #[error("operation failed: {0}")]
    Operation(eyre::Report),

    /// The operation panicked while running
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The operation did not finish within its timeout
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The task was cancelled through its handle
    #[error("task cancelled")]
    Cancelled,

    /// The scheduler shut down before the task settled
    #[error("scheduler closed")]
    SchedulerClosed,
}

impl TaskError {
    /// Whether the retry policy may consider this error at all.
    ///
    /// Cancellation and shutdown always terminate the task.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Operation(_) | Self::Panicked(_) | Self::Timeout(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
