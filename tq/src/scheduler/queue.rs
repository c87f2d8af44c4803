//! Pending-task queue for the scheduler
//!
//! Records are kept in descending priority order, FIFO within a priority tier.
//! Retries bypass the ordering through [`PriorityQueue::insert_front`].

use std::collections::VecDeque;
use std::sync::Arc;

use super::record::{TaskId, TaskRecord};

/// Queue of records waiting for admission
#[derive(Debug, Default)]
pub(crate) struct PriorityQueue {
    entries: VecDeque<Arc<TaskRecord>>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert before the first record with strictly lower priority
    pub fn insert(&mut self, record: Arc<TaskRecord>) {
        let priority = record.priority();
        match self.entries.iter().position(|r| r.priority() < priority) {
            Some(index) => self.entries.insert(index, record),
            None => self.entries.push_back(record),
        }
    }

    /// Put a retried record at the head, ahead of all fresh work
    pub fn insert_front(&mut self, record: Arc<TaskRecord>) {
        self.entries.push_front(record);
    }

    /// Remove a specific record if it is still queued
    pub fn remove(&mut self, id: TaskId) -> Option<Arc<TaskRecord>> {
        let index = self.entries.iter().position(|r| r.id == id)?;
        self.entries.remove(index)
    }

    pub fn pop_front(&mut self) -> Option<Arc<TaskRecord>> {
        self.entries.pop_front()
    }

    #[cfg(test)]
    pub fn contains(&self, id: TaskId) -> bool {
        self.entries.iter().any(|r| r.id == id)
    }

    /// Drop every queued record, returning them
    pub fn drain(&mut self) -> Vec<Arc<TaskRecord>> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queued ids in dequeue order
    pub fn ids(&self) -> Vec<TaskId> {
        self.entries.iter().map(|r| r.id).collect()
    }
}
