//! Submitted work and the handle its submitter awaits
//!
//! The queue holds tasks with different result and error types, so each one
//! is boxed behind [`Job`]. A job is consumed exactly once: either `run`
//! (dispatch) or `reject` (cancel/close), and both paths answer the
//! submitter's oneshot.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error};

use super::classify::TransientClassifier;
use super::error::TaskError;
use super::queue::{SchedulerEvent, TaskId, TaskOutcome};
use super::retry::{RetryPolicy, retry_transient};

/// Typed transient predicate supplied for a single task
pub(crate) type ErrorPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Why a job was answered without running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    Cancelled,
    Closed,
}

/// What a job needs from the scheduler once dispatched
pub(crate) struct DispatchContext {
    pub id: TaskId,
    pub policy: RetryPolicy,
    pub classifier: TransientClassifier,
    pub events: broadcast::Sender<SchedulerEvent>,
    pub settled: mpsc::UnboundedSender<Settlement>,
}

/// Result of running a job, reported back to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Settlement {
    pub id: TaskId,
    pub outcome: TaskOutcome,
    pub attempts: u32,
}

pub(crate) trait Job: Send {
    /// Run with retries, report the settlement, then answer the submitter
    fn run(self: Box<Self>, ctx: DispatchContext) -> BoxFuture<'static, ()>;

    /// Answer the submitter without running
    fn reject(self: Box<Self>, rejection: Rejection);
}

pub(crate) struct TypedJob<F, T, E> {
    operation: F,
    is_transient: Option<ErrorPredicate<E>>,
    reply: oneshot::Sender<Result<T, TaskError<E>>>,
}

impl<F, T, E> TypedJob<F, T, E> {
    pub(crate) fn new(
        operation: F,
        is_transient: Option<ErrorPredicate<E>>,
        reply: oneshot::Sender<Result<T, TaskError<E>>>,
    ) -> Self {
        Self {
            operation,
            is_transient,
            reply,
        }
    }
}

impl<F, Fut, T, E> Job for TypedJob<F, T, E>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn run(self: Box<Self>, ctx: DispatchContext) -> BoxFuture<'static, ()> {
        let TypedJob {
            operation,
            is_transient,
            reply,
        } = *self;
        let DispatchContext {
            id,
            policy,
            classifier,
            events,
            settled,
        } = ctx;

        Box::pin(async move {
            let classify = move |error: &E| match &is_transient {
                Some(predicate) => predicate(error),
                None => classifier.is_transient(&error.to_string()),
            };
            let mut retries = 0u32;
            let on_retry = |retry, delay| {
                retries = retry;
                let _ = events.send(SchedulerEvent::Retrying { id, retry, delay });
            };

            let attempt = AssertUnwindSafe(retry_transient(operation, classify, policy, on_retry))
                .catch_unwind()
                .await;
            let result = attempt.unwrap_or_else(|_| {
                error!(%id, "Task panicked");
                Err(TaskError::Panicked { attempts: retries + 1 })
            });
            let (outcome, attempts) = match &result {
                Ok(_) => (TaskOutcome::Succeeded, retries + 1),
                Err(e @ TaskError::Exhausted { .. }) => (TaskOutcome::Exhausted, e.attempts()),
                Err(e @ TaskError::Panicked { .. }) => (TaskOutcome::Panicked, e.attempts()),
                Err(e) => (TaskOutcome::Failed, e.attempts()),
            };

            // the dispatcher settles before the submitter can observe the result
            let _ = settled.send(Settlement { id, outcome, attempts });
            if reply.send(result).is_err() {
                debug!(%id, "TypedJob::run: submitter dropped its handle");
            }
        })
    }

    fn reject(self: Box<Self>, rejection: Rejection) {
        let error = match rejection {
            Rejection::Cancelled => TaskError::Cancelled,
            Rejection::Closed => TaskError::Closed,
        };
        let _ = self.reply.send(Err(error));
    }
}

/// Outcome handle for a submitted task
///
/// Resolves exactly once. If the scheduler goes away without answering
/// (runtime shutdown), it resolves to [`TaskError::Closed`].
#[must_use = "a TaskHandle does nothing unless awaited"]
pub struct TaskHandle<T, E> {
    id: TaskId,
    rx: oneshot::Receiver<Result<T, TaskError<E>>>,
}

impl<T, E> TaskHandle<T, E> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<T, TaskError<E>>>) -> Self {
        Self { id, rx }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<T, E> fmt::Debug for TaskHandle<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, TaskError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Closed)))
    }
}
