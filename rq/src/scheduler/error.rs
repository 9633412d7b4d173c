//! Scheduler error types

use thiserror::Error;

/// Terminal outcome of a task that did not succeed
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// Non-transient failure, propagated without retrying
    #[error("Task failed after {attempts} attempt(s): {error}")]
    Failed { error: E, attempts: u32 },

    /// Transient failure that outlasted the retry budget
    #[error("Task still throttled after {attempts} attempt(s): {error}")]
    Exhausted { error: E, attempts: u32 },

    /// Discarded from the queue before it was dispatched
    #[error("Task cancelled before dispatch")]
    Cancelled,

    /// The operation panicked; its slot was released
    #[error("Task panicked on attempt {attempts}")]
    Panicked { attempts: u32 },

    /// The scheduler stopped accepting work, or went away before settling
    #[error("Scheduler closed")]
    Closed,
}

impl<E> TaskError<E> {
    /// Number of times the operation ran (0 if it never ran)
    pub fn attempts(&self) -> u32 {
        match self {
            TaskError::Failed { attempts, .. }
            | TaskError::Exhausted { attempts, .. }
            | TaskError::Panicked { attempts } => *attempts,
            TaskError::Cancelled | TaskError::Closed => 0,
        }
    }

    /// The last failure returned by the operation, if it ran
    pub fn error(&self) -> Option<&E> {
        match self {
            TaskError::Failed { error, .. } | TaskError::Exhausted { error, .. } => Some(error),
            TaskError::Panicked { .. } | TaskError::Cancelled | TaskError::Closed => None,
        }
    }

    /// Consume and return the operation's last failure, if it ran
    pub fn into_error(self) -> Option<E> {
        match self {
            TaskError::Failed { error, .. } | TaskError::Exhausted { error, .. } => Some(error),
            TaskError::Panicked { .. } | TaskError::Cancelled | TaskError::Closed => None,
        }
    }

    /// Check if this task was discarded by `clear`, `cancel` or `shutdown`
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    /// Check if the operation panicked instead of returning
    pub fn is_panicked(&self) -> bool {
        matches!(self, TaskError::Panicked { .. })
    }

    /// Check if this task gave up on a transient failure
    pub fn is_exhausted(&self) -> bool {
        matches!(self, TaskError::Exhausted { .. })
    }
}

/// Errors from the scheduler itself
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid scheduler config: {0}")]
    InvalidConfig(String),

    #[error("Scheduler closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempts() {
        let err: TaskError<String> = TaskError::Exhausted {
            error: "too many requests".to_string(),
            attempts: 4,
        };
        assert_eq!(err.attempts(), 4);
        assert!(err.is_exhausted());
        assert!(!err.is_cancelled());

        let err: TaskError<String> = TaskError::Cancelled;
        assert_eq!(err.attempts(), 0);
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_accessors() {
        let err: TaskError<String> = TaskError::Failed {
            error: "404 not found".to_string(),
            attempts: 1,
        };
        assert_eq!(err.error().map(String::as_str), Some("404 not found"));
        assert_eq!(err.into_error(), Some("404 not found".to_string()));

        let err: TaskError<String> = TaskError::Panicked { attempts: 2 };
        assert_eq!(err.attempts(), 2);
        assert!(err.is_panicked());
        assert!(err.error().is_none());

        let err: TaskError<String> = TaskError::Closed;
        assert!(err.error().is_none());
        assert!(err.into_error().is_none());
    }

    #[test]
    fn test_display_carries_last_failure() {
        let err: TaskError<String> = TaskError::Exhausted {
            error: "rate limit hit".to_string(),
            attempts: 4,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("4 attempt(s)"));
        assert!(rendered.contains("rate limit hit"));
    }
}
