//! Retry with capped exponential backoff for store calls

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff with a bounded number of attempts
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay after the given (1-based) failed attempt
    pub fn delay_at(&self, attempt: u32) -> Duration {
        let exp = std::cmp::min(attempt.saturating_sub(1), 20);
        let factor = 1u32 << exp;
        std::cmp::min(self.base_delay.saturating_mul(factor), self.max_delay)
    }
}

pub async fn retry_async<F, Fut, T, E, R>(policy: &RetryPolicy, is_retryable: R, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= policy.max_attempts || !is_retryable(&e) {
                    return Err(e);
                }
                let delay = policy.delay_at(attempt);
                log::debug!("Store call failed (attempt {}), retrying in {:?}: {}", attempt, delay, e);
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50), Duration::from_millis(300));
        assert_eq!(policy.delay_at(1), Duration::from_millis(50));
        assert_eq!(policy.delay_at(2), Duration::from_millis(100));
        assert_eq!(policy.delay_at(3), Duration::from_millis(200));
        assert_eq!(policy.delay_at(4), Duration::from_millis(300));
        assert_eq!(policy.delay_at(30), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_retries_only_retryable_errors() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_async(&policy, |e: &String| e == "reset", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("reset".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        calls.store(0, Ordering::SeqCst);
        let result: Result<(), String> = retry_async(&policy, |e: &String| e == "reset", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("syntax".to_string()) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(2));
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = retry_async(&policy, |_: &String| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err("timeout".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(1));
    }
}
