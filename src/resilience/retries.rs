//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed fetch gets another attempt
//! - Execute retries with exponential backoff + jitter
//! - Bound every attempt with a deadline
//!
//! # Design Decisions
//! - Only the fetch is retried; persist and signal are not idempotent enough
//!   to repeat blindly
//! - Jittered backoff prevents thundering herd on the authority
//! - The caller classifies errors; this module only counts and sleeps

use std::future::Future;
use std::time::Duration;

use crate::config::ReloadConfig;
use crate::resilience::backoff::calculate_backoff;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&ReloadConfig> for RetryPolicy {
    fn from(config: &ReloadConfig) -> Self {
        Self {
            max_attempts: config.fetch_attempts.max(1),
            base_delay_ms: config.backoff_base_ms,
            max_delay_ms: config.backoff_max_ms,
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent. Returns the last error in the latter cases.
pub async fn retry<T, E, F, Fut, R>(policy: &RetryPolicy, mut op: F, is_retryable: R) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_retryable(&e) => {
                let delay = calculate_backoff(attempt, policy.base_delay_ms, policy.max_delay_ms);
                tracing::info!(attempt, delay = ?delay, error = %e, "Retrying after failure");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Race `fut` against `limit`, mapping expiry into the caller's error type.
pub async fn with_deadline<T, E, Fut>(limit: Duration, fut: Fut, on_timeout: impl FnOnce(Duration) -> E) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout(limit)),
    }
}
