//! Statistics for the scheduler

use serde::Serialize;

/// Point-in-time copy of the scheduler counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Tasks ever submitted
    pub total: u64,
    /// Tasks waiting in the queue
    pub queued: usize,
    /// Tasks holding a concurrency slot (running or waiting out a retry delay)
    pub active: usize,
    pub succeeded: u64,
    pub failed: u64,
    /// Tasks settled by their handle's `cancel()`
    pub cancelled: u64,
    /// Highest `active` value seen
    pub peak_active: usize,
}

impl SchedulerStats {
    /// Nothing queued and nothing in flight
    pub fn is_idle(&self) -> bool {
        self.queued == 0 && self.active == 0
    }

    /// Tasks that reached a final outcome
    pub fn settled(&self) -> u64 {
        self.succeeded + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle() {
        assert!(SchedulerStats::default().is_idle());
        let busy = SchedulerStats {
            active: 1,
            ..Default::default()
        };
        assert!(!busy.is_idle());
    }

    #[test]
    fn test_settled_sums_outcomes() {
        let stats = SchedulerStats {
            total: 6,
            succeeded: 3,
            failed: 2,
            cancelled: 1,
            ..Default::default()
        };
        assert_eq!(stats.settled(), 6);
    }

    #[test]
    fn test_serializes_for_reports() {
        let json = serde_json::to_value(SchedulerStats {
            total: 2,
            succeeded: 2,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(json["total"], 2);
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["queued"], 0);
    }
}
