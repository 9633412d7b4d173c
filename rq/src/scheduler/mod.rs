//! Scheduler for throttled providers
//!
//! Runs submitted async operations in FIFO order with a concurrency limit,
//! a minimum delay between dispatches, and exponential-backoff retries for
//! transient (rate-limit) failures.

mod classify;
mod config;
mod core;
mod error;
mod messages;
mod queue;
mod retry;
mod task;

pub use classify::TransientClassifier;
pub use config::{DEFAULT_TRANSIENT_MARKERS, SchedulerConfig};
pub use self::core::Scheduler;
pub use error::{SchedulerError, TaskError};
pub use queue::{QueueEntry, QueueEntryStatus, QueueState, SchedulerEvent, SchedulerStats, TaskId, TaskOutcome};
pub use retry::{RetryPolicy, backoff_delay, retry_transient};
pub use task::TaskHandle;
