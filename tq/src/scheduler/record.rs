//! Task records: the unit of schedulable state
//!
//! A record is shared between the scheduler actor and the caller's handle.
//! The operation's output type is erased behind [`Job`] so one queue can hold
//! tasks of any result type.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::options::TaskPolicy;
use crate::error::TaskError;

/// Identifier assigned to each submission, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Write-once result slot backing a task handle
pub(crate) struct OutcomeSlot<T> {
    tx: Mutex<Option<oneshot::Sender<Result<T, TaskError>>>>,
}

impl<T> OutcomeSlot<T> {
    pub fn new() -> (Self, oneshot::Receiver<Result<T, TaskError>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Mutex::new(Some(tx)) }, rx)
    }

    /// Settle the slot. Returns false if it was already settled.
    pub fn settle(&self, outcome: Result<T, TaskError>) -> bool {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        match tx {
            Some(tx) => {
                // A dropped receiver still counts as settled
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }
}

/// Deferred success settlement produced by a finished attempt
pub(crate) type Delivery = Box<dyn FnOnce() -> bool + Send>;

/// Type-erased operation plus its outcome slot
pub(crate) trait Job: Send + Sync {
    /// Spawn one attempt of the operation
    fn start(&self) -> JoinHandle<Result<Delivery, TaskError>>;

    /// Settle the outcome with an error. Returns false if already settled.
    fn settle_err(&self, error: TaskError) -> bool;

    fn is_settled(&self) -> bool;
}

pub(crate) struct Operation<T, F> {
    op: Arc<F>,
    slot: Arc<OutcomeSlot<T>>,
}

impl<T, F> Operation<T, F> {
    pub fn new(op: F, slot: OutcomeSlot<T>) -> Self {
        Self {
            op: Arc::new(op),
            slot: Arc::new(slot),
        }
    }
}

impl<T, F, Fut> Job for Operation<T, F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = eyre::Result<T>> + Send + 'static,
{
    fn start(&self) -> JoinHandle<Result<Delivery, TaskError>> {
        let op = Arc::clone(&self.op);
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            match op().await {
                Ok(value) => Ok(Box::new(move || slot.settle(Ok(value))) as Delivery),
                Err(e) => Err(TaskError::Operation(e)),
            }
        })
    }

    fn settle_err(&self, error: TaskError) -> bool {
        self.slot.settle(Err(error))
    }

    fn is_settled(&self) -> bool {
        self.slot.is_settled()
    }
}

/// Render a panic payload from a failed attempt
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Bookkeeping for one submitted unit of work
pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub policy: TaskPolicy,
    attempts: AtomicU32,
    executions: AtomicU32,
    /// Set by the first `cancel()`; keeps the record from being (re)admitted
    cancel_requested: AtomicBool,
    /// Set only when cancellation won settlement
    cancelled: AtomicBool,
    job: Box<dyn Job>,
}

impl TaskRecord {
    pub fn new(id: TaskId, policy: TaskPolicy, job: Box<dyn Job>) -> Self {
        Self {
            id,
            policy,
            attempts: AtomicU32::new(0),
            executions: AtomicU32::new(0),
            cancel_requested: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            job,
        }
    }

    pub fn priority(&self) -> i32 {
        self.policy.priority
    }

    /// Failed attempts so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }

    /// Times the operation has been started
    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::Acquire)
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Flip the cancel-requested flag. Returns true only for the call that flipped it.
    pub fn request_cancel(&self) -> bool {
        !self.cancel_requested.swap(true, Ordering::AcqRel)
    }

    /// Settle with [`TaskError::Cancelled`]. Returns false if already settled.
    pub fn settle_cancelled(&self) -> bool {
        // Set before sending so a woken waiter already sees it
        self.cancelled.store(true, Ordering::Release);
        let won = self.job.settle_err(TaskError::Cancelled);
        if !won {
            self.cancelled.store(false, Ordering::Release);
        }
        won
    }

    /// Whether the task's outcome is the cancellation
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Count a failed attempt, returning the new total
    pub fn record_failure(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Start one attempt, counting it as an execution
    pub fn start(&self) -> JoinHandle<Result<Delivery, TaskError>> {
        self.executions.fetch_add(1, Ordering::AcqRel);
        self.job.start()
    }

    pub fn settle_err(&self, error: TaskError) -> bool {
        self.job.settle_err(error)
    }

    pub fn is_settled(&self) -> bool {
        self.job.is_settled()
    }

    /// Snapshot handed to error listeners
    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            priority: self.priority(),
            attempts: self.attempts(),
            executions: self.executions(),
            max_retries: self.policy.max_retries,
            cancelled: self.is_cancelled(),
        }
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("priority", &self.priority())
            .field("attempts", &self.attempts())
            .field("cancel_requested", &self.cancel_requested())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Read-only view of a task record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub priority: i32,
    /// Failed attempts so far
    pub attempts: u32,
    /// Times the operation has been started
    pub executions: u32,
    pub max_retries: u32,
    /// The task settled as cancelled
    pub cancelled: bool,
}
