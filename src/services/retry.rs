// src/services/retry.rs

//! Retry with capped exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Capped exponential backoff: `min(cap, base * 2^attempt)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    /// No waiting between attempts.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let multiplier = 2_u32.saturating_pow(attempt);
        self.base.saturating_mul(multiplier).min(self.cap)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// How many times to try, and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget runs out. Returns the last result and the number of
    /// attempts made.
    ///
    /// Cancellation interrupts the backoff sleep; the last error is
    /// returned in that case.
    pub async fn retry<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> (Result<T>, u32)
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return (Ok(value), attempt),
                Err(e) if !e.is_retryable() || attempt >= self.max_attempts => {
                    return (Err(e), attempt);
                }
                Err(e) => {
                    let delay = self.backoff.delay(attempt);
                    log::debug!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return (Err(e), attempt),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Backoff::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(4), Duration::from_secs(10));
        assert_eq!(backoff.delay(40), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_zero_base_stays_zero() {
        assert_eq!(Backoff::none().delay(10), Duration::ZERO);
    }

    #[test]
    fn test_backoff_overflow_saturates() {
        let backoff = Backoff::new(Duration::from_secs(u64::MAX / 2), Duration::MAX);
        assert!(backoff.delay(64) > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_retry_stops_at_budget() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Backoff::none());

        let (result, attempts) = policy
            .retry(&CancellationToken::new(), |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::validation("always"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_returns_first_success() {
        let policy = RetryPolicy::new(5, Backoff::none());

        let (result, attempts) = policy
            .retry(&CancellationToken::new(), |attempt| async move {
                if attempt < 2 {
                    Err(AppError::validation("flaky"))
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_final_errors() {
        let policy = RetryPolicy::new(5, Backoff::none());

        let (result, attempts) = policy
            .retry(&CancellationToken::new(), |_| async {
                Err::<(), _>(AppError::Cancelled)
            })
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(
            5,
            Backoff::new(Duration::from_secs(3600), Duration::from_secs(3600)),
        );

        let (result, attempts) = tokio::time::timeout(
            Duration::from_secs(5),
            policy.retry(&cancel, |_| async {
                Err::<(), _>(AppError::validation("down"))
            }),
        )
        .await
        .unwrap();

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
