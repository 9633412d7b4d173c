//! Scheduler implementation

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use super::classify::TransientClassifier;
use super::config::SchedulerConfig;
use super::error::SchedulerError;
use super::messages::Command;
use super::queue::{QueueEntry, QueueEntryStatus, QueueState, SchedulerEvent, SchedulerStats, TaskId, TaskOutcome};
use super::retry::RetryPolicy;
use super::task::{DispatchContext, ErrorPredicate, Job, Rejection, Settlement, TaskHandle, TypedJob};

/// Buffered events per subscriber before the slowest one starts lagging
const EVENT_CAPACITY: usize = 256;

/// The Scheduler runs submitted tasks in FIFO order with bounded
/// concurrency, a minimum spacing between dispatches, and retries on
/// transient failures.
///
/// The handle is cheap to clone; every clone drives the same dispatcher.
/// The dispatcher stops once all handles are dropped (or `shutdown` ran),
/// the queue is empty and nothing is running.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SchedulerEvent>,
    config: Arc<SchedulerConfig>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Spawn a scheduler that classifies failures by the configured markers
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let classifier = TransientClassifier::markers(config.transient_markers.clone());
        Self::spawn_with_classifier(config, classifier)
    }

    /// Spawn a scheduler with a custom transient-failure classifier
    pub fn spawn_with_classifier(
        config: SchedulerConfig,
        classifier: TransientClassifier,
    ) -> Result<Self, SchedulerError> {
        debug!(?config, "Scheduler::spawn_with_classifier: called");
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let dispatcher = Dispatcher::new(config.clone(), classifier, events.clone(), settled_tx);
        tokio::spawn(dispatcher.run(rx, settled_rx));

        info!(
            max_concurrent = config.max_concurrent,
            min_dispatch_delay_ms = config.min_dispatch_delay_ms,
            max_retries = config.max_retries,
            "Scheduler spawned"
        );
        Ok(Self {
            tx,
            events,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queue an operation; the returned handle resolves once it settles
    pub fn submit<F, Fut, T, E>(&self, operation: F) -> TaskHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.enqueue(operation, None)
    }

    /// Queue an operation with its own typed transient predicate
    ///
    /// The predicate replaces the scheduler's classifier for this task only.
    pub fn submit_classified<F, Fut, T, E, P>(&self, operation: F, is_transient: P) -> TaskHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.enqueue(operation, Some(Arc::new(is_transient)))
    }

    fn enqueue<F, Fut, T, E>(&self, operation: F, is_transient: Option<ErrorPredicate<E>>) -> TaskHandle<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let id = TaskId::new();
        debug!(%id, "Scheduler::submit: called");
        let (reply, rx) = oneshot::channel();
        let job: Box<dyn Job> = Box::new(TypedJob::new(operation, is_transient, reply));

        if let Err(mpsc::error::SendError(command)) = self.tx.send(Command::Submit { id, job }) {
            warn!(%id, "Scheduler::submit: scheduler closed, rejecting");
            if let Command::Submit { job, .. } = command {
                job.reject(Rejection::Closed);
            }
        }
        TaskHandle::new(id, rx)
    }

    /// Number of tasks waiting to be dispatched
    pub async fn queue_length(&self) -> Result<usize, SchedulerError> {
        debug!("Scheduler::queue_length: called");
        self.request(|reply| Command::QueueLength { reply }).await
    }

    /// Discard every queued task; running tasks are unaffected
    ///
    /// Each discarded handle resolves to `TaskError::Cancelled`. Returns how
    /// many were discarded.
    pub async fn clear(&self) -> Result<usize, SchedulerError> {
        debug!("Scheduler::clear: called");
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Remove one queued task; returns false if it is running or unknown
    pub async fn cancel(&self, id: TaskId) -> Result<bool, SchedulerError> {
        debug!(%id, "Scheduler::cancel: called");
        self.request(|reply| Command::Cancel { id, reply }).await
    }

    /// Stop accepting work and cancel everything still queued
    ///
    /// Running tasks finish normally. Later submissions resolve to
    /// `TaskError::Closed`, and later queries fail with `SchedulerError::Closed`.
    pub async fn shutdown(&self) -> Result<usize, SchedulerError> {
        debug!("Scheduler::shutdown: called");
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Get current queue state
    pub async fn queue_state(&self) -> Result<QueueState, SchedulerError> {
        debug!("Scheduler::queue_state: called");
        self.request(|reply| Command::QueueState { reply }).await
    }

    /// Get running and queued tasks, running first, queued in dispatch order
    pub async fn queue_details(&self) -> Result<Vec<QueueEntry>, SchedulerError> {
        debug!("Scheduler::queue_details: called");
        self.request(|reply| Command::QueueDetails { reply }).await
    }

    pub async fn stats(&self) -> Result<SchedulerStats, SchedulerError> {
        Ok(self.queue_state().await?.stats)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(command(reply)).map_err(|_| SchedulerError::Closed)?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }
}

/// A task waiting in the queue
struct QueuedTask {
    id: TaskId,
    submitted_at: Instant,
    job: Box<dyn Job>,
}

/// Actor that owns the queue and all scheduling state
struct Dispatcher {
    max_concurrent: usize,
    min_dispatch_delay: std::time::Duration,
    policy: RetryPolicy,
    classifier: TransientClassifier,

    /// Waiting tasks, front is next to dispatch
    queue: VecDeque<QueuedTask>,

    /// Executing tasks and when they were dispatched
    running: HashMap<TaskId, Instant>,

    last_dispatch: Option<Instant>,
    accepting: bool,
    stats: SchedulerStats,
    events: broadcast::Sender<SchedulerEvent>,
    settled_tx: mpsc::UnboundedSender<Settlement>,
}

impl Dispatcher {
    fn new(
        config: SchedulerConfig,
        classifier: TransientClassifier,
        events: broadcast::Sender<SchedulerEvent>,
        settled_tx: mpsc::UnboundedSender<Settlement>,
    ) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            min_dispatch_delay: config.min_dispatch_delay(),
            policy: RetryPolicy::from(&config),
            classifier,
            queue: VecDeque::new(),
            running: HashMap::new(),
            last_dispatch: None,
            accepting: true,
            stats: SchedulerStats::default(),
            events,
            settled_tx,
        }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<Command>,
        mut settled_rx: mpsc::UnboundedReceiver<Settlement>,
    ) {
        debug!("Dispatcher::run: called");
        let mut commands_open = true;

        loop {
            self.dispatch_due();

            if !commands_open && self.queue.is_empty() && self.running.is_empty() {
                break;
            }

            let next_due = self.next_due();
            // a job reports its settlement before answering its submitter, so
            // settlements are drained ahead of any command that follows
            tokio::select! {
                biased;
                Some(settlement) = settled_rx.recv() => self.settle(settlement),
                command = rx.recv(), if commands_open => match command {
                    Some(command) => {
                        while let Ok(settlement) = settled_rx.try_recv() {
                            self.settle(settlement);
                        }
                        self.dispatch_due();
                        self.handle(command, &mut rx);
                    }
                    None => {
                        debug!("Dispatcher::run: all handles dropped, draining");
                        commands_open = false;
                    }
                },
                _ = sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {}
            }
        }

        info!(stats = ?self.stats, "Dispatcher stopped");
    }

    /// When the front task may start, or None if nothing can start
    fn next_due(&self) -> Option<Instant> {
        if self.queue.is_empty() || self.running.len() >= self.max_concurrent {
            return None;
        }
        Some(match self.last_dispatch {
            Some(last) => last + self.min_dispatch_delay,
            None => Instant::now(),
        })
    }

    fn dispatch_due(&mut self) {
        while let Some(due) = self.next_due() {
            if due > Instant::now() {
                break;
            }
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.dispatch(task);
        }
    }

    fn dispatch(&mut self, task: QueuedTask) {
        let QueuedTask { id, submitted_at, job } = task;
        let now = Instant::now();
        let waited = now - submitted_at;

        self.last_dispatch = Some(now);
        self.running.insert(id, now);
        self.stats.total_dispatched += 1;
        self.stats.total_wait_time_ms += waited.as_millis() as u64;
        self.stats.peak_concurrent = self.stats.peak_concurrent.max(self.running.len());

        debug!(%id, ?waited, active = self.running.len(), queued = self.queue.len(), "Dispatching");
        let _ = self.events.send(SchedulerEvent::Dispatched { id, waited });

        let ctx = DispatchContext {
            id,
            policy: self.policy,
            classifier: self.classifier.clone(),
            events: self.events.clone(),
            settled: self.settled_tx.clone(),
        };
        tokio::spawn(job.run(ctx));
    }

    fn settle(&mut self, settlement: Settlement) {
        let Settlement { id, outcome, attempts } = settlement;
        debug!(%id, %outcome, attempts, "Dispatcher::settle: called");

        if self.running.remove(&id).is_none() {
            warn!(%id, "Dispatcher::settle: task was not running");
        }

        match outcome {
            TaskOutcome::Succeeded => self.stats.total_succeeded += 1,
            TaskOutcome::Exhausted => self.stats.total_exhausted += 1,
            TaskOutcome::Failed | TaskOutcome::Panicked => self.stats.total_failed += 1,
        }
        self.stats.total_retries += u64::from(attempts.saturating_sub(1));

        let _ = self.events.send(SchedulerEvent::Settled { id, outcome, attempts });
    }

    fn handle(&mut self, command: Command, rx: &mut mpsc::UnboundedReceiver<Command>) {
        debug!(command = command.name(), "Dispatcher::handle: called");
        match command {
            Command::Submit { id, job } => self.enqueue(id, job),
            Command::QueueLength { reply } => {
                let _ = reply.send(self.queue.len());
            }
            Command::QueueState { reply } => {
                let _ = reply.send(self.queue_state());
            }
            Command::QueueDetails { reply } => {
                let _ = reply.send(self.queue_details());
            }
            Command::Clear { reply } => {
                let cleared = self.cancel_queued();
                info!(cleared, "Queue cleared");
                let _ = reply.send(cleared);
            }
            Command::Cancel { id, reply } => {
                let _ = reply.send(self.cancel_one(id));
            }
            Command::Shutdown { reply } => {
                self.accepting = false;
                rx.close();
                let cancelled = self.cancel_queued();
                info!(cancelled, running = self.running.len(), "Scheduler shutting down");
                let _ = reply.send(cancelled);
            }
        }
    }

    fn enqueue(&mut self, id: TaskId, job: Box<dyn Job>) {
        if !self.accepting {
            debug!(%id, "Dispatcher::enqueue: shutting down, rejecting");
            job.reject(Rejection::Closed);
            return;
        }

        self.queue.push_back(QueuedTask {
            id,
            submitted_at: Instant::now(),
            job,
        });
        let depth = self.queue.len();
        self.stats.total_submitted += 1;
        self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(depth);

        debug!(%id, depth, "Queued");
        let _ = self.events.send(SchedulerEvent::Queued { id, depth });
    }

    fn cancel_queued(&mut self) -> usize {
        let cancelled: Vec<_> = self.queue.drain(..).collect();
        let count = cancelled.len();
        for task in cancelled {
            self.reject_cancelled(task);
        }
        count
    }

    fn cancel_one(&mut self, id: TaskId) -> bool {
        match self.queue.iter().position(|t| t.id == id) {
            Some(index) => {
                if let Some(task) = self.queue.remove(index) {
                    self.reject_cancelled(task);
                }
                true
            }
            None => {
                debug!(%id, running = self.running.contains_key(&id), "Dispatcher::cancel_one: not queued");
                false
            }
        }
    }

    fn reject_cancelled(&mut self, task: QueuedTask) {
        let id = task.id;
        task.job.reject(Rejection::Cancelled);
        self.stats.total_cancelled += 1;
        debug!(%id, "Cancelled");
        let _ = self.events.send(SchedulerEvent::Cancelled { id });
    }

    fn queue_state(&self) -> QueueState {
        QueueState {
            queued: self.queue.len(),
            active: self.running.len(),
            stats: self.stats.clone(),
        }
    }

    fn queue_details(&self) -> Vec<QueueEntry> {
        let now = Instant::now();

        let mut running: Vec<_> = self.running.iter().collect();
        running.sort_by_key(|(_, started)| **started);

        let running = running.into_iter().map(|(id, started)| QueueEntry {
            id: *id,
            status: QueueEntryStatus::Running,
            elapsed: now - *started,
        });
        let queued = self.queue.iter().map(|t| QueueEntry {
            id: t.id,
            status: QueueEntryStatus::Queued,
            elapsed: now - t.submitted_at,
        });

        running.chain(queued).collect()
    }
}
