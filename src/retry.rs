//! Retry with exponential backoff for idempotent requests
//!
//! Only idempotent reads (artifact downloads) go through here. Submissions are
//! never retried by the client, and status polling has its own fixed cadence.
//!
//! # Example
//!
//! ```no_run
//! use syncdub_client::retry::with_retry;
//! use syncdub_client::config::RetryConfig;
//! use syncdub_client::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let bytes = with_retry(&config, || async {
//!     // An idempotent GET
//!     Ok::<u64, Error>(0)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classifies errors as transient (worth retrying) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_body(),
            // Gateway hiccups and throttling, not client mistakes
            Error::HttpStatus { status, .. } => {
                matches!(status, 408 | 429) || (500..600).contains(status)
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Error::TransientPoll { .. } => true,
            Error::Validation { .. }
            | Error::Submission { .. }
            | Error::Protocol(_)
            | Error::Task(_)
            | Error::Precondition(_)
            | Error::Config { .. }
            | Error::Serialization(_)
            | Error::InvalidUrl(_)
            | Error::Cancelled
            | Error::FileCollision { .. } => false,
        }
    }
}

/// Run `operation`, retrying retryable failures with exponential backoff
///
/// Returns the first success, the first non-retryable error, or the last
/// error once `config.max_attempts` retries are used up.
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
                    tracing::info!(attempts = attempt + 1, "request succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = wait.as_millis(),
                    "request failed, retrying"
                );
                tokio::time::sleep(wait).await;

                // Out-of-range products (overflow, NaN) saturate at max_delay
                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .map_or(config.max_delay, |next| next.min(config.max_delay));
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(error = %e, attempts = attempt + 1, "retries exhausted");
                } else {
                    tracing::debug!(error = %e, "request failed with non-retryable error");
                }
                return Err(e);
            }
        }
    }
}

/// Stretch a delay by a random factor in [1, 2]
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + factor)).unwrap_or(delay)
}
