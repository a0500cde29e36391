//! Bounded retry of price lookups.

use std::future::Future;
use std::time::Duration;

use pullfeed_price::PriceError;
use tracing::warn;

/// Fixed-delay retry for transient price service failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, the first included. Zero is treated as one.
    pub attempts: u32,
    /// Pause between tries.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// Only [`PriceError::Unavailable`] and [`PriceError::InvalidResponse`]
    /// are retried.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, PriceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PriceError>>,
    {
        let attempts = self.attempts.max(1);
        let mut tried = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if tried < attempts && is_transient(&e) => {
                    warn!(attempt = tried, of = attempts, error = %e, "price lookup failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    tried += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_transient(err: &PriceError) -> bool {
    matches!(
        err,
        PriceError::Unavailable(_) | PriceError::InvalidResponse(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(2),
        };
        let value = policy
            .run(|| async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PriceError::Unavailable("timeout".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await
            .expect("third try succeeds");
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::default()
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PriceError::Unavailable("down".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, PriceError::Unavailable("down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let err = RetryPolicy::default()
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PriceError::NoKnownFeeds)
            })
            .await
            .unwrap_err();
        assert_eq!(err, PriceError::NoKnownFeeds);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_tries_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy {
            attempts: 0,
            delay: Duration::ZERO,
        };
        let _ = policy
            .run(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(PriceError::Unavailable("down".to_string()))
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
