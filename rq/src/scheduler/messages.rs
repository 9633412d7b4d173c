//! Scheduler messages
//!
//! Commands sent from `Scheduler` handles to the dispatcher actor.

use tokio::sync::oneshot;

use super::queue::{QueueEntry, QueueState, TaskId};
use super::task::Job;

pub(crate) enum Command {
    Submit {
        id: TaskId,
        job: Box<dyn Job>,
    },
    QueueLength {
        reply: oneshot::Sender<usize>,
    },
    QueueState {
        reply: oneshot::Sender<QueueState>,
    },
    QueueDetails {
        reply: oneshot::Sender<Vec<QueueEntry>>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    Cancel {
        id: TaskId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<usize>,
    },
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Submit { .. } => "submit",
            Command::QueueLength { .. } => "queue_length",
            Command::QueueState { .. } => "queue_state",
            Command::QueueDetails { .. } => "queue_details",
            Command::Clear { .. } => "clear",
            Command::Cancel { .. } => "cancel",
            Command::Shutdown { .. } => "shutdown",
        }
    }
}
