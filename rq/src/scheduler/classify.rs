//! Transient-failure classification

use std::fmt;
use std::sync::Arc;

use super::config::DEFAULT_TRANSIENT_MARKERS;

/// Decides whether a failure message is a throttling signal worth retrying
#[derive(Clone)]
pub struct TransientClassifier {
    predicate: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl TransientClassifier {
    /// Match any of the given markers as a case-sensitive substring
    pub fn markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let markers: Vec<String> = markers.into_iter().map(Into::into).collect();
        Self::from_fn(move |message| markers.iter().any(|m| message.contains(m.as_str())))
    }

    /// Use an arbitrary predicate over the failure message
    pub fn from_fn<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Treat every failure as terminal
    pub fn never() -> Self {
        Self::from_fn(|_| false)
    }

    pub fn is_transient(&self, message: &str) -> bool {
        (self.predicate)(message)
    }
}

impl Default for TransientClassifier {
    fn default() -> Self {
        Self::markers(DEFAULT_TRANSIENT_MARKERS.iter().copied())
    }
}

impl fmt::Debug for TransientClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransientClassifier").finish_non_exhaustive()
    }
}
