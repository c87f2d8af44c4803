//! TaskHandle - caller-side view of a submitted task

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::Command;
use super::record::{TaskId, TaskInfo, TaskRecord};
use crate::error::TaskError;

/// Cancels a task from anywhere, independent of who awaits its handle
#[derive(Clone)]
pub struct Canceller {
    record: Arc<TaskRecord>,
    tx: mpsc::WeakUnboundedSender<Command>,
}

impl Canceller {
    /// Cancel the task.
    ///
    /// Settles the handle with [`TaskError::Cancelled`] right away and keeps
    /// the task from being admitted or retried again. An operation already
    /// running is not interrupted; its result is discarded. Returns false if
    /// the task was already cancelled or had already settled.
    pub fn cancel(&self) -> bool {
        let id = self.record.id;
        debug!(%id, "Canceller::cancel: called");

        if self.record.is_settled() || !self.record.request_cancel() {
            debug!(%id, "Canceller::cancel: already settled or cancelled");
            return false;
        }
        if !self.record.settle_cancelled() {
            debug!(%id, "Canceller::cancel: lost settlement race");
            return false;
        }

        // Without a live scheduler there is nothing to dequeue
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(Command::Cancel { id });
        }
        true
    }

    /// True only if cancellation won: the handle resolves to [`TaskError::Cancelled`]
    pub fn is_cancelled(&self) -> bool {
        self.record.is_cancelled()
    }
}

/// Handle to a submitted task.
///
/// Await it for the task's result; the result is assigned exactly once.
pub struct TaskHandle<T> {
    canceller: Canceller,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        record: Arc<TaskRecord>,
        rx: oneshot::Receiver<Result<T, TaskError>>,
        tx: mpsc::WeakUnboundedSender<Command>,
    ) -> Self {
        Self {
            canceller: Canceller { record, tx },
            rx,
        }
    }

    pub fn id(&self) -> TaskId {
        self.canceller.record.id
    }

    /// See [`Canceller::cancel`]
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// A cloneable canceller for use while the handle is being awaited
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.canceller.is_cancelled()
    }

    /// Failed attempts so far
    pub fn attempts(&self) -> u32 {
        self.canceller.record.attempts()
    }

    /// Times the operation has been started
    pub fn executions(&self) -> u32 {
        self.canceller.record.executions()
    }

    pub fn info(&self) -> TaskInfo {
        self.canceller.record.info()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The slot lives in the record we hold, so this only happens on teardown
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::SchedulerClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("record", &self.canceller.record)
            .finish()
    }
}
