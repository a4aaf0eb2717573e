use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::error::ComicError;

/// Exponential backoff with a bounded retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_retries: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_retries,
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Additional attempts after the first one.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay slept after failed attempt number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(700, 30_000, 2)
    }
}

/// Run `operation` until it succeeds or the policy's retry budget is spent.
///
/// Attempts run strictly one after another; the backoff sleep only suspends this call. The
/// last attempt's error is returned unchanged. `operation` receives the zero-based attempt
/// number.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, ComicError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ComicError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(label, attempt, "call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_retries() => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed; backing off before retry"
                );
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            Err(err) => {
                warn!(label, attempts = attempt + 1, error = %err, "retry budget exhausted");
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = RetryPolicy::new(250, 8_000, 2);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(250));
    }

    #[test]
    fn doubles_from_seven_hundred_millis_by_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(700));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_400));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2_800));
        assert_eq!(policy.max_retries(), 2);
    }

    #[test]
    fn caps_delay_at_max() {
        let policy = RetryPolicy::new(1_000, 4_000, 5);
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(4_000));
    }

    fn flaky_error() -> ComicError {
        ComicError::Network {
            operation: "execute".into(),
            message: "connection reset".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_two_failures_with_doubling_backoff() {
        let started_at = Instant::now();
        let attempts: Arc<Mutex<Vec<Instant>>> = Arc::default();

        let recorded = attempts.clone();
        let result = retry_with_backoff(&RetryPolicy::default(), "flaky", move |attempt| {
            recorded.lock().expect("attempt log").push(Instant::now());
            async move {
                if attempt < 2 {
                    Err(flaky_error())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.expect("third attempt should succeed"), "done");

        let attempts = attempts.lock().expect("attempt log");
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0] - started_at, Duration::ZERO);
        let first_gap = attempts[1] - attempts[0];
        let second_gap = attempts[2] - attempts[1];
        assert_eq!(first_gap, Duration::from_millis(700));
        assert_eq!(second_gap, Duration::from_millis(1_400));
        assert!(second_gap >= first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_budget_is_exhausted() {
        let started_at = Instant::now();
        let err = retry_with_backoff(&RetryPolicy::default(), "always-down", |attempt| async move {
            Err::<(), _>(ComicError::StoreError {
                code: 500 + attempt as u16,
                message: format!("attempt {attempt}"),
            })
        })
        .await
        .expect_err("every attempt fails");

        assert_eq!(
            err,
            ComicError::StoreError {
                code: 502,
                message: "attempt 2".into()
            }
        );
        // No sleep follows the final attempt.
        assert_eq!(started_at.elapsed(), Duration::from_millis(2_100));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_budget_runs_exactly_once() {
        let mut calls = 0;
        let policy = RetryPolicy::default().with_max_retries(0);
        let err = retry_with_backoff(&policy, "once", |_| {
            calls += 1;
            async { Err::<(), _>(flaky_error()) }
        })
        .await
        .expect_err("single attempt fails");

        assert_eq!(calls, 1);
        assert_eq!(err.code(), "network_error");
    }
}
