//! Timeout and retry policy for external collaborator calls
//!
//! Both the oracle and the evidence gatherer are called through
//! [`call_with_retry`], which bounds each attempt by a timeout and retries
//! transient failures with exponential backoff.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{EvidenceFetchError, OracleError};

/// Retry policy for failed collaborator calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the first call
    pub max_retries: usize,

    /// Base delay for exponential backoff
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Set backoff base duration
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set maximum backoff duration
    pub fn with_backoff_max(mut self, max: Duration) -> Self {
        self.backoff_max = max;
        self
    }

    /// Calculate delay for a given retry attempt (exponential backoff)
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let multiplier = 2u32.saturating_pow(attempt as u32);
        let delay = self.backoff_base.saturating_mul(multiplier);
        delay.min(self.backoff_max)
    }

    /// Check if more retries are allowed
    pub fn should_retry(&self, attempts: usize) -> bool {
        attempts < self.max_retries
    }

    /// Create a no-retry policy
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

/// Errors that know whether another attempt is worthwhile and how to
/// represent an attempt that ran out of time.
pub trait Transient: Display {
    fn is_transient(&self) -> bool;
    fn timed_out(after: Duration) -> Self;
}

impl Transient for OracleError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        OracleError::Timeout(after)
    }
}

impl Transient for EvidenceFetchError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    fn timed_out(after: Duration) -> Self {
        EvidenceFetchError::Timeout(after)
    }
}

/// Run `op` with a per-attempt timeout, retrying transient failures.
///
/// Returns the last error once retries are exhausted; callers decide how to
/// degrade.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    attempt_timeout: Duration,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries = 0;
    loop {
        let result = match tokio::time::timeout(attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(attempt_timeout)),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && policy.should_retry(retries) => {
                let delay = policy.delay_for_attempt(retries);
                warn!(call = label, attempt = retries + 1, error = %e, "Call failed, will retry");
                debug!(call = label, delay_ms = delay.as_millis() as u64, "Backing off");
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy::new(max_retries).with_backoff_base(Duration::from_millis(1))
    }

    #[test]
    fn test_delay_for_attempt_is_exponential_and_capped() {
        let policy = RetryPolicy::new(5)
            .with_backoff_base(Duration::from_millis(100))
            .with_backoff_max(Duration::from_millis(350));

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    #[tokio::test]
    async fn test_call_with_retry_recovers_after_transient_failure() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, OracleError> =
            call_with_retry(&fast_policy(2), Duration::from_secs(1), "test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(OracleError::Unreachable("refused".into()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_call_with_retry_is_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), EvidenceFetchError> =
            call_with_retry(&fast_policy(2), Duration::from_secs(1), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EvidenceFetchError::RateLimited) }
            })
            .await;

        assert_eq!(result.unwrap_err(), EvidenceFetchError::RateLimited);
        // first call + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_call_with_retry_does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), EvidenceFetchError> =
            call_with_retry(&fast_policy(2), Duration::from_secs(1), "test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(EvidenceFetchError::Unauthorized) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_call_with_retry_times_out() {
        let result: Result<(), OracleError> =
            call_with_retry(&RetryPolicy::no_retry(), Duration::from_millis(10), "slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err(), OracleError::Timeout(Duration::from_millis(10)));
    }
}
