//! # Retry Policy
//!
//! Bounded retries with capped exponential backoff for one logical outbound
//! call. Every attempt runs under its own timeout; only errors that classify
//! themselves as transient are retried.

use crate::resilience::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Errors that know whether another attempt could succeed
pub trait Retryable: std::fmt::Display {
    fn is_retryable(&self) -> bool;

    /// Error produced when an attempt exceeds the per-attempt timeout
    fn timed_out(after: Duration) -> Self;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds, fails permanently or runs out of
    /// attempts. The last error is returned on exhaustion.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.timeout();
        let mut attempt: u32 = 0;

        loop {
            let outcome = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(E::timed_out(timeout)),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "✅ Succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) if !error.is_retryable() => {
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        error = %error,
                        "Non-retryable failure"
                    );
                    return Err(error);
                }
                Err(error) if attempt + 1 >= max_attempts => {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %error,
                        "❌ Retries exhausted"
                    );
                    return Err(error);
                }
                Err(error) => {
                    let delay = self.config.backoff_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "🔄 Retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Permanent,
        Timeout,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            !matches!(self, TestError::Permanent)
        }

        fn timed_out(_after: Duration) -> Self {
            TestError::Timeout
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts,
            backoff_base_seconds: 0.001,
            timeout_seconds: 0.05,
            max_wait_seconds: 0.005,
        })
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy(3)
            .execute("test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(3)
            .execute("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Transient)
            })
            .await;

        assert_eq!(result, Err(TestError::Transient));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .execute("test", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(TestError::Permanent)
            })
            .await;

        assert_eq!(result, Err(TestError::Permanent));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_attempt_times_out_and_retries() {
        let attempts = AtomicU32::new(0);
        let result = fast_policy(2)
            .execute("test", || async {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok::<_, TestError>("second attempt")
            })
            .await;

        assert_eq!(result, Ok("second attempt"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_error_when_every_attempt_hangs() {
        let result: Result<(), TestError> = fast_policy(1)
            .execute("test", || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(TestError::Timeout));
    }
}
