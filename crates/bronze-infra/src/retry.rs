//! Connect-with-retry for the message transport and other external collaborators.
//!
//! Backoff is linear: attempt `n` (1-based) waits `base * n` before the next try.
//! Once retries are exhausted the last error is returned and the owning process is
//! expected to exit.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay after the given failed attempt (1-based).
pub fn linear_backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(attempt)
}

pub async fn connect_with_retry<T, E, F, Fut>(
    target: &str,
    max_retries: u32,
    base_backoff: Duration,
    mut connect: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_retries = max_retries.max(1);
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(target_name = target, attempt, "Connected after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_retries => {
                let delay = linear_backoff(base_backoff, attempt);
                tracing::warn!(
                    target_name = target,
                    attempt,
                    max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    target_name = target,
                    attempt,
                    error = %e,
                    "Connection failed, retries exhausted"
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_linear_backoff() {
        let base = Duration::from_secs(1);
        assert_eq!(linear_backoff(base, 1), Duration::from_secs(1));
        assert_eq!(linear_backoff(base, 2), Duration::from_secs(2));
        assert_eq!(linear_backoff(base, 5), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<&str, String> =
            connect_with_retry("broker", 5, Duration::from_millis(1), || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("refused #{}", n))
                    } else {
                        Ok("connected")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_error_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), String> =
            connect_with_retry("broker", 3, Duration::from_millis(1), || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Err(format!("refused #{}", n))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), "refused #3");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_still_tries_once() {
        let result: Result<u8, String> =
            connect_with_retry("broker", 0, Duration::from_millis(1), || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
