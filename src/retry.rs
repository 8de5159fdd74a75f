//! Bounded retry with exponential backoff for remote calls.
//!
//! Transient failures (rate limits, 5xx, connection errors) are retried up to
//! a fixed attempt count; everything else fails immediately. The jitter term
//! is deterministic so retry schedules are reproducible in tests.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AppError;

/// Maximum number of attempts per remote call (first try included).
pub const MAX_ATTEMPTS: u32 = 5;

/// Base delay for the first retry.
const BASE_DELAY_MS: u64 = 500;

/// Multiplier applied per retry.
const BACKOFF_FACTOR: u64 = 2;

/// Returns the delay to sleep before retry number `attempt` (1-based count of
/// failures so far). Exponential with a small deterministic jitter.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY_MS * BACKOFF_FACTOR.pow(attempt.saturating_sub(1));
    let jitter = 10 * u64::from(attempt % 7);
    Duration::from_millis(exp + jitter)
}

/// Runs `op` until it succeeds, returns a non-transient error, or the attempt
/// budget is exhausted. A `RateLimited` response with a server-provided
/// `Retry-After` sleeps at least that long.
pub async fn with_retry<T, F, Fut>(op_name: &str, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                attempt += 1;
                if attempt >= MAX_ATTEMPTS {
                    warn!("{} failed after {} attempts: {}", op_name, attempt, err);
                    return Err(err);
                }

                let mut delay = backoff_delay(attempt);
                if let AppError::RateLimited {
                    retry_after_secs: Some(secs),
                } = &err
                {
                    delay = delay.max(Duration::from_secs(*secs));
                }

                warn!(
                    "{} attempt {} failed ({}), retrying in {:?}",
                    op_name, attempt, err, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
