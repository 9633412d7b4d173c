//! Retry with exponential backoff for transient failures
//!
//! The delay before retry `n` (1-based) is `base * 2^(n-1)`, so with the
//! default 2s base a task waits 2s, 4s, then 8s.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::config::SchedulerConfig;
use super::error::TaskError;

/// How many times to retry, and the delay that seeds the backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay to wait before the given retry (1-based)
    pub fn backoff(&self, retry: u32) -> Duration {
        backoff_delay(self.base_delay, retry)
    }
}

impl From<&SchedulerConfig> for RetryPolicy {
    fn from(config: &SchedulerConfig) -> Self {
        Self::new(config.max_retries, config.min_dispatch_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

/// Exponential backoff delay; retry 0 means "no wait"
pub fn backoff_delay(base: Duration, retry: u32) -> Duration {
    if retry == 0 {
        return Duration::ZERO;
    }
    let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Run `operation` until it succeeds, fails terminally, or runs out of retries
///
/// `on_retry` is called with the retry number and the delay just before each
/// backoff sleep.
pub async fn retry_transient<F, Fut, T, E, C, R>(
    mut operation: F,
    is_transient: C,
    policy: RetryPolicy,
    mut on_retry: R,
) -> Result<T, TaskError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    C: Fn(&E) -> bool,
    R: FnMut(u32, Duration),
{
    debug!(?policy, "retry_transient: called");
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let error = match operation().await {
            Ok(value) => {
                debug!(attempts, "retry_transient: succeeded");
                return Ok(value);
            }
            Err(error) => error,
        };

        if !is_transient(&error) {
            debug!(attempts, %error, "retry_transient: non-transient failure");
            return Err(TaskError::Failed { error, attempts });
        }

        let retries_used = attempts - 1;
        if retries_used >= policy.max_retries {
            warn!(attempts, %error, "retry_transient: retries exhausted");
            return Err(TaskError::Exhausted { error, attempts });
        }

        let retry = retries_used + 1;
        let delay = policy.backoff(retry);
        warn!(
            retry,
            backoff_ms = delay.as_millis() as u64,
            %error,
            "retry_transient: retrying after transient error"
        );
        on_retry(retry, delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[allow(clippy::ptr_arg)]
    fn is_throttle(e: &String) -> bool {
        e.contains("too many requests")
    }

    #[test]
    fn test_backoff_delay_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_zero_retry() {
        assert_eq!(backoff_delay(Duration::from_secs(1), 0), Duration::ZERO);
    }

    #[test]
    fn test_backoff_saturates() {
        let delay = backoff_delay(Duration::from_secs(1), 200);
        assert_eq!(delay, Duration::from_secs(1).saturating_mul(u32::MAX));
    }

    proptest! {
        #[test]
        fn prop_backoff_doubles(base_ms in 1u64..10_000, retry in 1u32..20) {
            let base = Duration::from_millis(base_ms);
            let next = backoff_delay(base, retry + 1);
            let current = backoff_delay(base, retry);
            prop_assert_eq!(next, current * 2);
            prop_assert_eq!(backoff_delay(base, 1), base);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_transient(
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("too many requests".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            is_throttle,
            RetryPolicy::new(3, Duration::from_millis(100)),
            |_, _| {},
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transient_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result: Result<(), _> = retry_transient(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("malformed response".to_string()) }
            },
            is_throttle,
            RetryPolicy::new(3, Duration::from_millis(100)),
            |_, _| {},
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, TaskError::Failed { attempts: 1, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_retries_and_delays() {
        let mut delays = Vec::new();

        let result: Result<(), _> = retry_transient(
            || async { Err("too many requests".to_string()) },
            is_throttle,
            RetryPolicy::new(2, Duration::from_millis(50)),
            |retry, delay| delays.push((retry, delay)),
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        assert_eq!(
            delays,
            vec![(1, Duration::from_millis(50)), (2, Duration::from_millis(100))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries() {
        let result: Result<(), _> = retry_transient(
            || async { Err("too many requests".to_string()) },
            is_throttle,
            RetryPolicy::new(0, Duration::from_millis(50)),
            |_, _| panic!("no retry expected"),
        )
        .await;

        assert!(matches!(result, Err(TaskError::Exhausted { attempts: 1, .. })));
    }
}
