//! Message types for the scheduler actor

use std::sync::Arc;

use tokio::sync::oneshot;

use super::record::{Delivery, TaskId, TaskInfo, TaskRecord};
use super::stats::SchedulerStats;
use crate::error::TaskError;

/// Callback invoked on every failed attempt, retried or not
pub type ErrorListener = Arc<dyn Fn(&TaskError, &TaskInfo) + Send + Sync>;

/// Identifies a subscribed error listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Requests processed by the scheduler actor
pub(crate) enum Command {
    /// Queue a new record
    Submit { record: Arc<TaskRecord> },

    /// A handle won settlement with a cancellation error
    Cancel { id: TaskId },

    /// An attempt finished (or timed out)
    AttemptFinished {
        id: TaskId,
        outcome: Result<Delivery, TaskError>,
    },

    /// A retry delay elapsed (internal)
    RetryReady { id: TaskId },

    /// Register an error listener
    Subscribe { id: ListenerId, listener: ErrorListener },

    /// Remove an error listener
    Unsubscribe { id: ListenerId },

    /// Get a stats snapshot
    GetStats {
        reply_tx: oneshot::Sender<SchedulerStats>,
    },

    /// Drop queued records without settling them
    ClearQueued { reply_tx: oneshot::Sender<usize> },

    /// Settle everything outstanding and stop
    Shutdown { reply_tx: Option<oneshot::Sender<()>> },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit { .. } => "Submit",
            Self::Cancel { .. } => "Cancel",
            Self::AttemptFinished { .. } => "AttemptFinished",
            Self::RetryReady { .. } => "RetryReady",
            Self::Subscribe { .. } => "Subscribe",
            Self::Unsubscribe { .. } => "Unsubscribe",
            Self::GetStats { .. } => "GetStats",
            Self::ClearQueued { .. } => "ClearQueued",
            Self::Shutdown { .. } => "Shutdown",
        }
    }
}
