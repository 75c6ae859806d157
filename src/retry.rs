//! Exponential-backoff retry for generation calls.
//!
//! Only transient backend errors (rate limiting, overload) are retried.
//! The wait between attempts is raced against the phase cancellation token so
//! a deadline firing mid-backoff ends the wait immediately.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{BackendError, RetryFailure};

pub const DEFAULT_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_EXP_BASE: f64 = 7.0;
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Backoff parameters for transient backend failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub attempts: u32,
    pub initial_delay: Duration,
    pub exp_base: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            exp_base: DEFAULT_EXP_BASE,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the `retry`-th retry (1-based):
    /// `min(initial_delay * exp_base^(retry-1), max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.exp_base.powi(exponent);
        let capped = secs.min(self.max_delay.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_delay
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempts run out.
///
/// `op` receives the 1-based attempt number. `on_retry` is called before each
/// backoff wait with the upcoming retry number, the delay and the error that
/// triggered it.
pub async fn with_retry<T, F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    label: &str,
    mut on_retry: R,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
    R: FnMut(u32, Duration, &BackendError),
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryFailure::Aborted(BackendError::Cancelled));
        }

        let err = match op(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(task = label, attempt, "backend_call_recovered");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() {
            return Err(RetryFailure::Aborted(err));
        }
        if attempt >= attempts {
            warn!(task = label, attempts, error = %err, "backend_retries_exhausted");
            return Err(RetryFailure::Exhausted {
                attempts,
                last: err,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            task = label,
            attempt,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "backend_retry_scheduled"
        );
        on_retry(attempt, delay, &err);

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryFailure::Aborted(BackendError::Cancelled));
            }
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
