//! Queue types for the scheduler

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// Identifier assigned to a task at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a dispatched task settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskOutcome {
    Succeeded,
    Failed,
    Exhausted,
    Panicked,
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Panicked => write!(f, "panicked"),
        }
    }
}

/// Lifecycle notifications broadcast to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Appended to the queue; `depth` includes this task
    Queued { id: TaskId, depth: usize },

    /// Started executing after `waited` in the queue
    Dispatched { id: TaskId, waited: Duration },

    /// Failed transiently and will run again after `delay`
    Retrying { id: TaskId, retry: u32, delay: Duration },

    /// Finished running
    Settled { id: TaskId, outcome: TaskOutcome, attempts: u32 },

    /// Removed from the queue without running
    Cancelled { id: TaskId },
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total_submitted: u64,
    pub total_dispatched: u64,
    pub total_succeeded: u64,
    pub total_failed: u64,
    pub total_exhausted: u64,
    pub total_cancelled: u64,
    pub total_retries: u64,
    pub total_wait_time_ms: u64,
    pub peak_queue_depth: usize,
    pub peak_concurrent: usize,
}

impl SchedulerStats {
    /// Tasks that have left the scheduler one way or another
    pub fn total_settled(&self) -> u64 {
        self.total_succeeded + self.total_failed + self.total_exhausted + self.total_cancelled
    }
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct QueueState {
    pub queued: usize,
    pub active: usize,
    pub stats: SchedulerStats,
}

/// Queue entry for display
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: TaskId,
    pub status: QueueEntryStatus,
    /// Time spent queued, or time spent running for active tasks
    pub elapsed: Duration,
}

/// Status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntryStatus {
    Running,
    Queued,
}
