//! Scheduler configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::SchedulerError;

/// Marker phrases that identify a provider-side throttling failure
pub const DEFAULT_TRANSIENT_MARKERS: &[&str] = &["请求过于频繁", "too many requests", "rate limit"];

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minimum delay between two dispatches, also the backoff seed
    #[serde(rename = "min-dispatch-delay-ms", default = "default_min_dispatch_delay_ms")]
    pub min_dispatch_delay_ms: u64,

    /// Max tasks executing at once
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Retries allowed after a transient failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Case-sensitive substrings that mark a failure as transient
    #[serde(rename = "transient-markers", default = "default_transient_markers")]
    pub transient_markers: Vec<String>,
}

fn default_min_dispatch_delay_ms() -> u64 {
    2000
}

fn default_max_concurrent() -> usize {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_transient_markers() -> Vec<String> {
    DEFAULT_TRANSIENT_MARKERS.iter().map(|m| m.to_string()).collect()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_dispatch_delay_ms: default_min_dispatch_delay_ms(),
            max_concurrent: default_max_concurrent(),
            max_retries: default_max_retries(),
            transient_markers: default_transient_markers(),
        }
    }
}

impl SchedulerConfig {
    /// Get the dispatch spacing as a Duration
    pub fn min_dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.min_dispatch_delay_ms)
    }

    /// Reject configurations the scheduler cannot honor
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.max_concurrent == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max-concurrent must be at least 1".to_string(),
            ));
        }
        if self.transient_markers.iter().any(|m| m.is_empty()) {
            return Err(SchedulerError::InvalidConfig(
                "transient-markers must not contain empty strings".to_string(),
            ));
        }
        Ok(())
    }
}
