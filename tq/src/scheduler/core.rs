//! Scheduler implementation
//!
//! [`Scheduler`] is a cloneable front that sends [`Command`]s to a single actor
//! task. The actor owns the queue, the active set, the counters and the
//! listeners; nothing else mutates them.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SchedulerConfig;
use super::handle::TaskHandle;
use super::messages::{Command, ErrorListener, ListenerId};
use super::options::{TaskDefaults, TaskOptions};
use super::queue::PriorityQueue;
use super::record::{Delivery, Operation, OutcomeSlot, TaskId, TaskInfo, TaskRecord, panic_message};
use super::stats::SchedulerStats;
use crate::error::TaskError;

/// Shared by every clone of a [`Scheduler`]; shuts the actor down on drop
struct SchedulerInner {
    tx: mpsc::UnboundedSender<Command>,
    defaults: TaskDefaults,
    drain_poll: Duration,
    next_task_id: AtomicU64,
    next_listener_id: AtomicU64,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        debug!("SchedulerInner::drop: last scheduler handle dropped, shutting down");
        let _ = self.tx.send(Command::Shutdown { reply_tx: None });
    }
}

/// Bounded-concurrency priority scheduler.
///
/// Admits at most `concurrency` operations at once, highest priority first
/// (FIFO within a priority), retries failures according to each task's
/// options, and enforces optional per-attempt timeouts.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Spawn the scheduler actor on the current tokio runtime
    pub fn spawn(config: SchedulerConfig) -> Result<Self> {
        let defaults = config.default_options();
        Self::spawn_with_defaults(config, defaults)
    }

    /// Spawn with explicit task defaults, e.g. a default retry predicate.
    ///
    /// Only the concurrency and drain poll interval are taken from `config`.
    pub fn spawn_with_defaults(config: SchedulerConfig, defaults: TaskDefaults) -> Result<Self> {
        debug!(?config, ?defaults, "Scheduler::spawn_with_defaults: called");
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let actor = SchedulerActor::new(config.concurrency, tx.clone(), rx);
        tokio::spawn(actor.run());

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                tx,
                defaults,
                drain_poll: config.drain_poll(),
                next_task_id: AtomicU64::new(0),
                next_listener_id: AtomicU64::new(0),
            }),
        })
    }

    /// Instance-level task defaults
    pub fn defaults(&self) -> &TaskDefaults {
        &self.inner.defaults
    }

    /// Submit an operation.
    ///
    /// `op` is called once per attempt. Unset `options` fields fall back to the
    /// scheduler defaults. If the scheduler has shut down the handle settles
    /// with [`TaskError::SchedulerClosed`].
    ///
    /// Priority ordering is decided per batch: the actor orders every
    /// submission it has already received before admitting any of them.
    /// Submissions racing in from other threads may land in separate batches,
    /// in which case an earlier batch can be admitted first.
    pub fn submit<T, F, Fut>(&self, op: F, options: TaskOptions) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<T>> + Send + 'static,
    {
        let id = TaskId(self.inner.next_task_id.fetch_add(1, Ordering::Relaxed));
        let policy = options.resolve(&self.inner.defaults);
        debug!(%id, priority = policy.priority, "Scheduler::submit: called");

        let (slot, rx) = OutcomeSlot::new();
        let record = Arc::new(TaskRecord::new(id, policy, Box::new(Operation::new(op, slot))));

        if self
            .inner
            .tx
            .send(Command::Submit {
                record: Arc::clone(&record),
            })
            .is_err()
        {
            warn!(%id, "Scheduler::submit: scheduler closed");
            record.settle_err(TaskError::SchedulerClosed);
        }

        TaskHandle::new(record, rx, self.inner.tx.downgrade())
    }

    /// Subscribe to every failed attempt, including ones that will be retried
    pub fn subscribe_error<L>(&self, listener: L) -> ListenerId
    where
        L: Fn(&TaskError, &TaskInfo) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed));
        debug!(listener = id.0, "Scheduler::subscribe_error: called");
        let listener: ErrorListener = Arc::new(listener);
        let _ = self.inner.tx.send(Command::Subscribe { id, listener });
        id
    }

    pub fn unsubscribe_error(&self, id: ListenerId) {
        debug!(listener = id.0, "Scheduler::unsubscribe_error: called");
        let _ = self.inner.tx.send(Command::Unsubscribe { id });
    }

    /// Copy of the current counters
    pub async fn snapshot_stats(&self) -> Result<SchedulerStats> {
        debug!("Scheduler::snapshot_stats: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .tx
            .send(Command::GetStats { reply_tx })
            .map_err(|_| eyre!("Scheduler channel closed"))?;
        reply_rx.await.map_err(|_| eyre!("Scheduler shutdown before reply"))
    }

    /// Drop every queued (not active) task without settling it.
    ///
    /// Handles of dropped tasks stay pending until cancelled. Returns how many
    /// tasks were dropped.
    pub async fn clear_queued(&self) -> Result<usize> {
        debug!("Scheduler::clear_queued: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .tx
            .send(Command::ClearQueued { reply_tx })
            .map_err(|_| eyre!("Scheduler channel closed"))?;
        reply_rx.await.map_err(|_| eyre!("Scheduler shutdown before reply"))
    }

    /// Wait until nothing is queued or active, polling at `drain-poll-ms`
    pub async fn drain_and_wait(&self) -> Result<()> {
        debug!("Scheduler::drain_and_wait: called");
        loop {
            let stats = self.snapshot_stats().await?;
            if stats.is_idle() {
                debug!("Scheduler::drain_and_wait: idle");
                return Ok(());
            }
            tokio::time::sleep(self.inner.drain_poll).await;
        }
    }

    /// Stop the actor, settling outstanding tasks with [`TaskError::SchedulerClosed`]
    pub async fn shutdown(&self) -> Result<()> {
        debug!("Scheduler::shutdown: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inner
            .tx
            .send(Command::Shutdown {
                reply_tx: Some(reply_tx),
            })
            .map_err(|_| eyre!("Scheduler channel closed"))?;
        reply_rx.await.map_err(|_| eyre!("Scheduler stopped before reply"))
    }
}

/// The actor owning all scheduler state
struct SchedulerActor {
    concurrency: usize,
    /// Handed to attempt wrappers and retry timers so they can report back
    tx: mpsc::UnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
    queue: PriorityQueue,
    active: HashMap<TaskId, Arc<TaskRecord>>,
    listeners: Vec<(ListenerId, ErrorListener)>,
    stats: SchedulerStats,
}

impl SchedulerActor {
    fn new(concurrency: usize, tx: mpsc::UnboundedSender<Command>, rx: mpsc::UnboundedReceiver<Command>) -> Self {
        Self {
            concurrency,
            tx,
            rx,
            queue: PriorityQueue::new(),
            active: HashMap::new(),
            listeners: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Run until shutdown.
    ///
    /// Every command already waiting in the channel is handled before a single
    /// drain pass, so a burst of submissions is ordered by priority as a whole.
    async fn run(mut self) {
        info!(concurrency = self.concurrency, "Scheduler started");

        let mut shutdown_reply = None;
        'outer: while let Some(cmd) = self.rx.recv().await {
            let mut next = Some(cmd);
            while let Some(cmd) = next.take() {
                if let Command::Shutdown { reply_tx } = cmd {
                    shutdown_reply = reply_tx;
                    break 'outer;
                }
                self.handle(cmd);
                next = self.rx.try_recv().ok();
            }
            self.drain();
        }

        self.close();
        if let Some(reply_tx) = shutdown_reply {
            let _ = reply_tx.send(());
        }
        info!("Scheduler stopped");
    }

    fn handle(&mut self, cmd: Command) {
        debug!(command = cmd.name(), "SchedulerActor::handle");
        match cmd {
            Command::Submit { record } => {
                self.stats.total += 1;
                self.queue.insert(record);
            }

            Command::Cancel { id } => {
                self.stats.cancelled += 1;
                if self.queue.remove(id).is_some() {
                    debug!(%id, "Cancelled queued task");
                } else if self.active.contains_key(&id) {
                    debug!(%id, "Cancelled active task, its result will be discarded");
                }
            }

            Command::AttemptFinished { id, outcome } => self.finish_attempt(id, outcome),

            Command::RetryReady { id } => {
                if let Some(record) = self.active.remove(&id) {
                    self.requeue(record);
                }
            }

            Command::Subscribe { id, listener } => {
                self.listeners.push((id, listener));
            }

            Command::Unsubscribe { id } => {
                self.listeners.retain(|(listener_id, _)| *listener_id != id);
            }

            Command::GetStats { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }

            Command::ClearQueued { reply_tx } => {
                debug!(ids = ?self.queue.ids(), "Clearing queued tasks");
                let dropped = self.queue.drain().len();
                info!(dropped, "Cleared queued tasks");
                let _ = reply_tx.send(dropped);
            }

            // Intercepted by `run`
            Command::Shutdown { .. } => {}
        }
    }

    /// Admit queued records while capacity allows
    fn drain(&mut self) {
        while self.active.len() < self.concurrency {
            let Some(record) = self.queue.pop_front() else {
                break;
            };
            if record.cancel_requested() {
                debug!(id = %record.id, "Skipping cancelled task");
                continue;
            }
            self.admit(record);
        }
    }

    fn admit(&mut self, record: Arc<TaskRecord>) {
        let id = record.id;
        let timeout = record.policy.timeout;
        debug!(%id, priority = record.priority(), attempts = record.attempts(), "Admitting task");

        let attempt = record.start();
        self.active.insert(id, record);
        self.stats.peak_active = self.stats.peak_active.max(self.active.len());

        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = run_attempt(attempt, timeout).await;
            let _ = tx.send(Command::AttemptFinished { id, outcome });
        });
    }

    fn finish_attempt(&mut self, id: TaskId, outcome: Result<Delivery, TaskError>) {
        let Some(record) = self.active.get(&id).cloned() else {
            warn!(%id, "Attempt finished for unknown task");
            return;
        };

        match outcome {
            Ok(deliver) => {
                if deliver() {
                    debug!(%id, "Task succeeded");
                    self.stats.succeeded += 1;
                } else {
                    debug!(%id, "Task already settled, discarding result");
                }
                self.active.remove(&id);
            }
            Err(err) => {
                self.notify(&err, &record);
                let attempts = record.record_failure();

                if record.policy.should_retry(record.cancel_requested(), attempts, &err) {
                    warn!(%id, attempts, error = %err, "Task attempt failed, retrying");
                    self.schedule_retry(record);
                } else {
                    if record.settle_err(err) {
                        warn!(%id, attempts, "Task failed");
                        self.stats.failed += 1;
                    } else {
                        debug!(%id, "Task already settled, discarding failure");
                    }
                    self.active.remove(&id);
                }
            }
        }
    }

    /// Hold the slot through the retry delay, then requeue at the front
    fn schedule_retry(&mut self, record: Arc<TaskRecord>) {
        let delay = record.policy.retry_delay;
        if delay.is_zero() {
            self.active.remove(&record.id);
            self.requeue(record);
            return;
        }

        let id = record.id;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::RetryReady { id });
        });
    }

    fn requeue(&mut self, record: Arc<TaskRecord>) {
        if record.cancel_requested() {
            debug!(id = %record.id, "Not requeueing cancelled task");
            return;
        }
        debug!(id = %record.id, "Requeueing task at front");
        self.queue.insert_front(record);
    }

    /// Call every listener; a panicking listener is logged and skipped
    fn notify(&self, err: &TaskError, record: &TaskRecord) {
        let info = record.info();
        for (id, listener) in &self.listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(err, &info))) {
                error!(
                    listener = id.0,
                    task = %info.id,
                    panic = %panic_message(payload),
                    "Error listener panicked"
                );
            }
        }
    }

    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.queue.len(),
            active: self.active.len(),
            ..self.stats
        }
    }

    /// Settle everything still outstanding
    fn close(&mut self) {
        let queued = self.queue.drain();
        let active: Vec<_> = self.active.drain().map(|(_, record)| record).collect();
        info!(queued = queued.len(), active = active.len(), "Closing scheduler");
        for record in queued.into_iter().chain(active) {
            record.settle_err(TaskError::SchedulerClosed);
        }
    }
}

/// Await one attempt, racing it against `timeout`.
///
/// On timeout the attempt's task is detached, not aborted: it keeps running and
/// its result is dropped.
async fn run_attempt(
    attempt: JoinHandle<std::result::Result<Delivery, TaskError>>,
    timeout: Option<Duration>,
) -> std::result::Result<Delivery, TaskError> {
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(joined) => joined,
            Err(_) => return Err(TaskError::Timeout(limit)),
        },
        None => attempt.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(join_err) if join_err.is_panic() => Err(TaskError::Panicked(panic_message(join_err.into_panic()))),
        Err(join_err) => Err(TaskError::Panicked(join_err.to_string())),
    }
}
