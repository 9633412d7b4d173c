//! ratequeue - rate-limited, retrying async task scheduler
//!
//! Guards a throttling provider (a cloud file host, an AI completion API)
//! by running every call through one [`Scheduler`]: calls start in FIFO
//! order, no closer together than a minimum delay, with a bound on how many
//! are in flight, and calls that fail with a rate-limit message are retried
//! with exponential backoff.
//!
//! # Modules
//!
//! - [`scheduler`] - The scheduler, its config, retry engine and classifier
//! - [`provider`] - Provider traits and the [`Throttled`] wrapper
//! - [`simulate`] - Simulated throttling provider used by `rq simulate`
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use ratequeue::{Scheduler, SchedulerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Scheduler::spawn(SchedulerConfig::default())?;
//! let url = scheduler
//!     .submit(|| async { Ok::<_, String>("https://files.example/song.mp3".to_string()) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod provider;
pub mod scheduler;
pub mod simulate;

// Re-export commonly used types
pub use config::{Config, LogConfig};
pub use provider::{CompletionProvider, FileHost, RemoteFile, Throttled};
pub use scheduler::{
    QueueEntry, QueueEntryStatus, QueueState, RetryPolicy, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerEvent, SchedulerStats, TaskError, TaskHandle, TaskId, TaskOutcome, TransientClassifier,
    retry_transient,
};
