//! Scheduler for asynchronous tasks
//!
//! Admits at most N tasks at once, orders pending work by priority (FIFO within
//! a priority), retries failures, enforces per-attempt timeouts and supports
//! cooperative cancellation.

mod config;
mod core;
mod handle;
mod messages;
mod options;
mod queue;
mod record;
mod stats;

pub use config::SchedulerConfig;
pub use self::core::Scheduler;
pub use handle::{Canceller, TaskHandle};
pub use messages::{ErrorListener, ListenerId};
pub use options::{RetryPredicate, TaskDefaults, TaskOptions};
pub use record::{TaskId, TaskInfo};
pub use stats::SchedulerStats;
