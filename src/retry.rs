//! Retry logic with exponential backoff
//!
//! Configurable retry for transient failures of remote service calls.
//! Implements exponential backoff with optional jitter to prevent
//! thundering herd across concurrently running jobs.
//!
//! # Example
//!
//! ```no_run
//! use stemsep::retry::with_retry;
//! use stemsep::config::RetryConfig;
//! use stemsep::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let result = with_retry(&config, || async {
//!     // Your operation here
//!     Ok::<_, Error>(())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection reset, request timeout, 5xx) should return
/// `true`. Permanent failures (bad credential, malformed request, exhausted
/// quota, disk full) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection-level and timeout failures are worth another try
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            // 5xx means the service itself is struggling, not our request
            Error::ServiceUnavailable { .. } => true,
            // Credential problems do not fix themselves mid-batch
            Error::Auth(_) => false,
            // The request would be just as malformed next time
            Error::Validation(_) => false,
            // Hammering an exhausted quota only burns the remaining jobs
            Error::QuotaExceeded(_) => false,
            // The remote side already gave up on this task
            Error::RemoteTaskFailed(_) => false,
            // The polling budget is a hard ceiling per job
            Error::PollTimeout { .. } => false,
            // Local filesystem failures need user action, not retries
            Error::Io(_) => false,
            // Config errors are permanent
            Error::Config { .. } => false,
            // Contract mismatches are permanent
            Error::Serialization(_) | Error::UnexpectedResponse(_) => false,
            // Cancellation must propagate immediately
            Error::Cancelled => false,
        }
    }
}

/// Execute an async operation with exponential backoff retry logic
///
/// Retryable failures wait an exponentially increasing delay (doubling per
/// attempt by default, capped at `max_delay`, jittered) and retry up to
/// `max_attempts` times. Non-retryable failures propagate immediately
/// without consuming retry budget.
///
/// Returns the successful result or the last error after all retry attempts
/// are exhausted.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    "Operation failed, retrying"
                );

                let jittered_delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tokio::time::sleep(jittered_delay).await;

                let next_delay =
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                delay = next_delay.min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        "Operation failed after all retry attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the
/// actual delay falls between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    let jittered_secs = delay.as_secs_f64() * (1.0 + jitter_factor);
    Duration::from_secs_f64(jittered_secs)
}
