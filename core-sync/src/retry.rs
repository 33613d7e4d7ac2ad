//! # Retry Executor
//!
//! Exponential backoff around any fallible async operation. Each failure is
//! classified; only recoverable errors are retried. The wait between attempts
//! is the one place that sleeps, and it wakes immediately when the
//! `CancellationToken` fires.

use crate::classified::{BoxError, ClassifiedError, ErrorCode};
use crate::classifier::classify;
use crate::error::SyncError;
use core_runtime::config::SyncSettings;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// `UnknownError` messages containing one of these are retried anyway.
const TRANSIENT_HINTS: &[&str] = &["temporary", "network", "timeout", "connection"];

/// Backoff parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&SyncSettings> for RetryConfig {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            max_attempts: settings.retry_max_attempts,
            base_delay: settings.retry_base_delay,
            max_delay: settings.retry_max_delay,
            multiplier: settings.retry_multiplier,
        }
    }
}

impl RetryConfig {
    /// Delay after failed attempt `attempt` (1-indexed):
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Whether a classified failure is worth another attempt.
///
/// Recoverable codes always are. `UnknownError` is retried when its message
/// looks transient, since unrecognised transport errors often end up there.
pub fn should_retry(error: &ClassifiedError) -> bool {
    if error.is_recoverable() {
        return true;
    }

    if error.code() == ErrorCode::UnknownError {
        let message = error.message().to_lowercase();
        return TRANSIENT_HINTS.iter().any(|hint| message.contains(hint));
    }

    false
}

/// Run `operation` up to `config.max_attempts` times.
///
/// Returns the first success. A non-recoverable failure is returned at once;
/// recoverable failures are retried after the backoff delay until attempts
/// run out, then the last classified error is returned. Cancelling `cancel`
/// during a wait returns a `Canceled` error without waiting out the delay.
pub async fn retry_with_backoff<T, E, F, Fut>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, ClassifiedError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => classify(e).with_context("attempt", attempt),
        };

        if !should_retry(&error) {
            debug!(attempt, code = %error.code(), "Not retrying non-recoverable error");
            return Err(error);
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, code = %error.code(), "Retries exhausted");
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Recoverable error, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(attempt, "Retry cancelled during backoff");
                return Err(classify(SyncError::Cancelled)
                    .with_context("attempt", attempt)
                    .with_context("last_error", error.code()));
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_schedule() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(30));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_from_settings() {
        let settings = SyncSettings {
            retry_max_attempts: 5,
            retry_multiplier: 3.0,
            ..SyncSettings::default()
        };
        let config = RetryConfig::from(&settings);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.multiplier, 3.0);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_error_heuristic() {
        let transient = ClassifiedError::new(ErrorCode::UnknownError, "Temporary glitch");
        let opaque = ClassifiedError::new(ErrorCode::UnknownError, "checksum field missing");
        let fatal = ClassifiedError::new(ErrorCode::InvalidCredentials, "network says no");

        assert!(should_retry(&transient));
        assert!(!should_retry(&opaque));
        assert!(!should_retry(&fatal));
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let cancel = CancellationToken::new();
        let result =
            retry_with_backoff(&cancel, &fast_config(3), || async { Ok::<_, BridgeError>(42) })
                .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_recoverable_is_attempted_once() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry_with_backoff(&cancel, &fast_config(5), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BridgeError::OperationFailed("InvalidAccessKeyId".to_string()))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::InvalidCredentials);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_error_with_transient_wording_is_retried() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry_with_backoff(&cancel, &fast_config(4), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(std::io::Error::other("connection glitch"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnknownError);
        assert!(!err.is_recoverable());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(&cancel, &fast_config(3), || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(BridgeError::Timeout("HEAD".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_returns_last_error() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = retry_with_backoff(&cancel, &fast_config(3), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BridgeError::Network {
                    message: "connection reset".to_string(),
                    temporary: true,
                })
            }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetworkError);
        assert_eq!(err.context().get("attempt").map(String::as_str), Some("3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let cancel = CancellationToken::new();
        let config = RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();
        let result: Result<(), _> = retry_with_backoff(&cancel, &config, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(BridgeError::Timeout("HEAD".to_string()))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().code(), ErrorCode::Canceled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
