//! Bounded retry with multiplicative backoff.

use crate::error::RetrievalError;
use plugaudit_core::RetrievalConfig;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Statuses treated as transient.
pub const RETRY_STATUSES: &[u16] = &[500, 502, 503, 504];

/// How many times a failed request is repeated and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from the `[retrieval]` configuration section.
    #[must_use]
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based): `backoff_base × 2^attempt`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }

    /// Transport failures and the statuses in [`RETRY_STATUSES`] are retried.
    #[must_use]
    pub fn should_retry(err: &RetrievalError) -> bool {
        match err {
            RetrievalError::Status { status, .. } => RETRY_STATUSES.contains(status),
            RetrievalError::Http(e) => !e.is_builder() && !e.is_redirect(),
            _ => false,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or retries are exhausted.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, RetrievalError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RetrievalError>>,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && Self::should_retry(&e) => {
                    let delay = self.delay(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Retrying after transient failure: {e}"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn status(code: u16) -> RetrievalError {
        RetrievalError::Status {
            status: code,
            url: "http://test/bundle.zip".to_string(),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
        };
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
    }

    #[test]
    fn test_should_retry_statuses() {
        for code in [500, 502, 503, 504] {
            assert!(RetryPolicy::should_retry(&status(code)));
        }
        for code in [400, 403, 404, 429, 501] {
            assert!(!RetryPolicy::should_retry(&status(code)));
        }
        assert!(!RetryPolicy::should_retry(&RetrievalError::Archive(
            "truncated".into()
        )));
    }

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_millis(1),
        };

        let value = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(status(503))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .expect("third attempt succeeds");

        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_base: Duration::from_millis(1),
        };

        let err = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(status(500)) }
            })
            .await
            .expect_err("always failing");

        assert_eq!(err.status(), Some(500));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_client_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let err = policy
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(status(404)) }
            })
            .await
            .expect_err("404 is permanent");

        assert_eq!(err.status(), Some(404));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
