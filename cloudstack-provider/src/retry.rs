//! Bounded retry for CloudStack calls that may fail transiently.
//!
//! Whether a failure is worth retrying is decided by a [`RetryPolicy`], so
//! the set of transient errors is configuration rather than string matching
//! buried in the handlers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::ApiError;

/// Attempts used when attaching a NIC.
pub const DEFAULT_ATTACH_ATTEMPTS: u32 = 10;

/// CloudStack error codes that usually clear up on their own:
/// API limit exceeded, internal error, resource unavailable, resource
/// allocation error, resource in use, network rule conflict.
pub const TRANSIENT_ERROR_CODES: &[u32] = &[429, 530, 534, 535, 536, 537];

/// Backoff settings for a retried operation.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one (must be >= 1)
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_ATTACH_ATTEMPTS,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Same attempt count without any waiting (tests).
    pub fn immediate(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

/// Decides whether a failed attempt should be retried.
#[derive(Clone)]
pub struct RetryPolicy {
    predicate: Arc<dyn Fn(&ApiError) -> bool + Send + Sync>,
}

impl RetryPolicy {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ApiError) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Transport failures, gateway errors and the [`TRANSIENT_ERROR_CODES`].
    ///
    /// A job timeout is not retried: the job may still complete on the server.
    pub fn transient() -> Self {
        Self::new(|err| match err {
            ApiError::Transport(_) => true,
            ApiError::Http { status, .. } => *status == 429 || *status >= 500,
            ApiError::Api { code, .. } => TRANSIENT_ERROR_CODES.contains(code),
            ApiError::NotFound(_) | ApiError::Decode(_) | ApiError::JobTimeout { .. } => false,
        })
    }

    /// Retry only CloudStack errors carrying one of `codes`, plus transport failures.
    pub fn error_codes(codes: Vec<u32>) -> Self {
        Self::new(move |err| match err {
            ApiError::Transport(_) => true,
            ApiError::Api { code, .. } => codes.contains(code),
            _ => false,
        })
    }

    /// Retry every failure.
    pub fn always() -> Self {
        Self::new(|_| true)
    }

    pub fn never() -> Self {
        Self::new(|_| false)
    }

    pub fn is_retryable(&self, err: &ApiError) -> bool {
        (self.predicate)(err)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::transient()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy").finish_non_exhaustive()
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `config.max_attempts` attempts have been made.
///
/// Returns the last error when attempts are exhausted.
pub async fn retry_with_policy<F, Fut, T>(
    config: &RetryConfig,
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ApiError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !policy.is_retryable(&e) {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed with non-retryable error"
                    );
                    return Err(e);
                }

                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Operation failed after max retries"
                    );
                    return Err(e);
                }

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Operation failed, retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
