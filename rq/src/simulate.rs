//! Simulated throttling provider for exercising a scheduler
//!
//! Every `throttle_every`-th task fails its first invocation with a
//! "too many requests" error, then succeeds on retry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::scheduler::{Scheduler, SchedulerError, SchedulerStats, TaskError, TaskId};

/// Message the simulated provider fails with when throttling
pub const THROTTLE_MESSAGE: &str = "simulated provider: too many requests";

/// Shape of a simulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOptions {
    pub tasks: usize,
    /// Throttle every k-th task on its first call (0 disables throttling)
    pub throttle_every: usize,
    /// Time each call takes, before jitter
    pub work: Duration,
    /// Add up to 25% random extra work time
    pub jitter: bool,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            tasks: 10,
            throttle_every: 3,
            work: Duration::from_millis(200),
            jitter: true,
        }
    }
}

/// What happened to one simulated task
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub index: usize,
    pub id: TaskId,
    pub status: TaskStatus,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ok,
    Failed,
    Exhausted,
    Cancelled,
    Closed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Failed => write!(f, "failed"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Result of a whole simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub tasks: Vec<TaskReport>,
    pub stats: SchedulerStats,
    pub elapsed_ms: u64,
}

fn should_throttle(index: usize, throttle_every: usize) -> bool {
    throttle_every > 0 && (index + 1) % throttle_every == 0
}

/// Submit `options.tasks` simulated calls and wait for all of them
pub async fn run(scheduler: &Scheduler, options: &SimulationOptions) -> Result<SimulationReport, SchedulerError> {
    debug!(?options, "simulate::run: called");
    let started = Instant::now();

    let mut pending = Vec::with_capacity(options.tasks);
    for index in 0..options.tasks {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let throttle = should_throttle(index, options.throttle_every);
        let work = options.work;
        let jitter = options.jitter;

        let handle = scheduler.submit(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            let extra_ms = if jitter {
                let max = (work.as_millis() / 4) as u64;
                rand::rng().random_range(0..=max)
            } else {
                0
            };
            let work = work + Duration::from_millis(extra_ms);
            async move {
                tokio::time::sleep(work).await;
                if throttle && call == 0 {
                    Err(THROTTLE_MESSAGE.to_string())
                } else {
                    Ok(index)
                }
            }
        });
        pending.push((index, handle.id(), calls, handle));
    }

    let results = join_all(pending.into_iter().map(|(index, id, calls, handle)| async move {
        let result = handle.await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let attempts = calls.load(Ordering::SeqCst);
        let (status, error) = match result {
            Ok(_) => (TaskStatus::Ok, None),
            Err(e @ TaskError::Failed { .. }) => (TaskStatus::Failed, Some(e.to_string())),
            Err(e @ TaskError::Exhausted { .. }) => (TaskStatus::Exhausted, Some(e.to_string())),
            Err(e @ TaskError::Panicked { .. }) => (TaskStatus::Failed, Some(e.to_string())),
            Err(TaskError::Cancelled) => (TaskStatus::Cancelled, None),
            Err(TaskError::Closed) => (TaskStatus::Closed, None),
        };
        TaskReport {
            index,
            id,
            status,
            attempts,
            elapsed_ms,
            error,
        }
    }))
    .await;

    let stats = scheduler.stats().await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(tasks = results.len(), elapsed_ms, "Simulation finished");

    Ok(SimulationReport {
        tasks: results,
        stats,
        elapsed_ms,
    })
}
