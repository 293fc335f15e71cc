//! Retry-with-backoff executor.

use super::{classify, ErrorCategory};
use crate::error::{Error, Result};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Ceiling for any computed retry delay.
pub const MAX_DELAY: Duration = Duration::from_secs(5 * 60);

/// Delay before retry number `attempt` (0-based) of a failed call.
///
/// A `Retry-After` value from the tracker wins, then the rate-limit reset
/// time, then exponential backoff from the category's base delay.
pub fn retry_delay(error: &Error, category: ErrorCategory, attempt: u32) -> Duration {
    if let Error::Tracker(tracker) = error {
        if let Some(after) = tracker.retry_after {
            return after.min(MAX_DELAY);
        }
        if category == ErrorCategory::RateLimit {
            if let Some(reset) = tracker.rate_limit_reset {
                let wait = (reset - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                return wait.min(MAX_DELAY);
            }
        }
    }

    let factor = 2u32.saturating_pow(attempt);
    category
        .base_delay()
        .checked_mul(factor)
        .unwrap_or(MAX_DELAY)
        .min(MAX_DELAY)
}

/// Run `operation` until it succeeds or its failure stops being retryable.
///
/// The effective retry limit is the smaller of `max_retries` and the
/// category maximum of the latest failure. On exhaustion the last error is
/// returned unmodified.
///
/// # Errors
///
/// Returns the last error produced by `operation`.
pub async fn with_retry<T, F, Fut>(label: &str, max_retries: u32, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = label, retries = attempt, "Recovered after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                let category = classify(&err);
                let limit = max_retries.min(category.max_retries());
                if attempt >= limit {
                    if attempt > 0 {
                        warn!(
                            operation = label,
                            %category,
                            retries = attempt,
                            error = %err,
                            "Giving up after retries"
                        );
                    }
                    return Err(err);
                }

                let delay = retry_delay(&err, category, attempt);
                attempt += 1;
                warn!(
                    operation = label,
                    %category,
                    attempt,
                    limit,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Retrying failed operation"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
