//! Outcome accounting for dispatched events.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Result of processing a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Event processed
    Success,
    /// Handler returned an error
    Failed,
    /// Event could not be queued
    Rejected,
}

impl TaskStatus {
    /// Returns true if the event completed successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success)
    }
}

/// Lock-free counters per [`TaskStatus`], shareable across shards.
#[derive(Debug, Default)]
pub struct TaskStats {
    success: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`TaskStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStatsSnapshot {
    pub success: u64,
    pub failed: u64,
    pub rejected: u64,
}

impl TaskStats {
    pub fn record(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Success => &self.success,
            TaskStatus::Failed => &self.failed,
            TaskStatus::Rejected => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskStatsSnapshot {
        TaskStatsSnapshot {
            success: self.success.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
