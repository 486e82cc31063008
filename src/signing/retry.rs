//! Retry policy for calls to the signing primitive.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::SigningError;

// == Retry Policy ==
/// Bounded exponential backoff applied to retryable signing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    // == Run ==
    /// Calls `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. Returns the last error in the latter cases.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, SigningError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SigningError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying signing call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = quick(5);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4));
        assert_eq!(policy.delay_for(10), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn test_retries_rate_limits_until_success() {
        let calls = &AtomicU32::new(0);
        let result = quick(3)
            .run(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SigningError::RateLimited("slow down".into()))
                } else {
                    Ok("signed")
                }
            })
            .await;

        assert_eq!(result, Ok("signed"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = quick(2)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SigningError::RateLimited("slow down".into()))
            })
            .await;

        assert!(matches!(result, Err(SigningError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_not_found() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = quick(5)
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SigningError::NotFound("a.jpg".into()))
            })
            .await;

        assert!(matches!(result, Err(SigningError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_none_makes_one_attempt() {
        let calls = &AtomicU32::new(0);
        let _: Result<(), _> = RetryPolicy::none()
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SigningError::RateLimited("429".into()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
