//! Bounded retry of transient storage failures.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::store::StoreError;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled after each retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RetryError {
    /// Every attempt hit a transient failure.
    Exhausted { attempts: u32 },
    /// The next backoff would run past the deadline.
    DeadlineExceeded,
    /// A non-transient failure; not retried.
    Failed(StoreError),
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts or
/// would overrun `deadline`.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    deadline: Instant,
    operation: &'static str,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(StoreError::DeadlineExceeded) => return Err(RetryError::DeadlineExceeded),
            Err(err) if !err.is_transient() => return Err(RetryError::Failed(err)),
            Err(err) if attempt >= max_attempts => {
                warn!(operation, attempt, error = %err, "retry budget exhausted");
                return Err(RetryError::Exhausted { attempts: attempt });
            }
            Err(err) => {
                if Instant::now() + backoff >= deadline {
                    return Err(RetryError::DeadlineExceeded);
                }
                warn!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %err,
                    "transient storage failure, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
        }
    }
}
