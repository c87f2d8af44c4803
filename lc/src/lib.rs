//! loadcache - keyed, de-duplicating load cache on top of the taskqueue scheduler
//!
//! A [`LoadCache`] runs a user loader for each key through a
//! [`taskqueue::Scheduler`], so loads share a concurrency limit, are ordered by
//! a key-derived priority, and are retried on loader failure. Concurrent loads
//! of the same key share one in-flight operation; successful values are kept.

pub mod cache;
pub mod config;
pub mod error;
pub mod priority;

pub use cache::LoadCache;
pub use config::LoadCacheConfig;
pub use error::LoadError;
pub use priority::{PriorityRule, PriorityRules};
