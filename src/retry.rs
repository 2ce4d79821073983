//! Bounded retry with backoff for transient failures.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Delay strategy between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay every time.
    Fixed(Duration),
    /// Delay doubles after each failure, capped at `max`.
    Exponential {
        /// Delay before the second attempt.
        initial: Duration,
        /// Upper bound.
        max: Duration,
    },
}

impl Backoff {
    const fn initial_delay(self) -> Duration {
        match self {
            Self::Fixed(delay) | Self::Exponential { initial: delay, .. } => delay,
        }
    }

    fn next_delay(self, current: Duration) -> Duration {
        match self {
            Self::Fixed(delay) => delay,
            Self::Exponential { max, .. } => current.saturating_mul(2).min(max),
        }
    }
}

/// Runs `attempt_fn` up to `attempts` times (at least once).
///
/// Errors for which `is_retryable` returns `false` are returned at once.
/// The last error is returned when every attempt fails.
///
/// # Errors
///
/// Returns the error of the final (or first non-retryable) attempt.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    attempts: u32,
    backoff: Backoff,
    description: &str,
    mut attempt_fn: F,
    mut is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: FnMut(&E) -> bool,
{
    let total = attempts.max(1);
    let mut delay = backoff.initial_delay();
    let mut attempt = 1;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= total || !is_retryable(&err) => return Err(err),
            Err(err) => {
                warn!(
                    attempt,
                    attempts = total,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    description,
                    error = %err,
                    "attempt failed, retrying with backoff"
                );
                tokio::time::sleep(delay).await;
                delay = backoff.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
