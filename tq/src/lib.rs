//! taskqueue - bounded-concurrency priority task scheduler
//!
//! Submit asynchronous operations to a [`Scheduler`]; at most `concurrency` run
//! at once, pending work is ordered by priority (FIFO within a priority),
//! failures are retried per task, attempts can time out, and every task can be
//! cancelled through its [`TaskHandle`].
//!
//! # Modules
//!
//! - [`scheduler`] - the scheduler actor, task handles and options
//! - [`error`] - errors surfaced through handles and listeners
//! - [`jobs`] - shell job files run through the scheduler (used by `tq`)
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod scheduler;

// Re-export commonly used types
pub use config::Config;
pub use error::TaskError;
pub use jobs::{JobFile, JobReport, JobSpec, run_jobs};
pub use scheduler::{
    Canceller, ErrorListener, ListenerId, RetryPredicate, Scheduler, SchedulerConfig, SchedulerStats, TaskDefaults,
    TaskHandle, TaskId, TaskInfo, TaskOptions,
};
