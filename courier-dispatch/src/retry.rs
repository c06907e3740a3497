//! Bounded retry with exponential backoff
//!
//! A [`RetryExecutor`] drives one provider attempt sequence. After failed
//! attempt `n` (1-based) it waits `base_delay * 2^n` before trying again:
//!
//! ```text
//! base_delay = 500ms, max_retries = 3
//!
//! attempt 1 fails → wait 1000ms
//! attempt 2 fails → wait 2000ms
//! attempt 3 fails → give up, surface the attempt 3 error
//! ```
//!
//! Every run starts its own sequence; nothing is carried across providers
//! or requests. The backoff sleep and the attempt itself both race the
//! caller's cancellation token.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RetryError;

/// Retry configuration for a single provider attempt sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per provider, including the first one
    ///
    /// Default: 3
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Base unit for exponential backoff (in milliseconds)
    ///
    /// The delay after failed attempt `n` is `base * 2^n`.
    ///
    /// Default: 500
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::max_retries(),
            base_delay_ms: defaults::base_delay_ms(),
        }
    }
}

mod defaults {
    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn base_delay_ms() -> u64 {
        500
    }
}

/// Runs an operation with bounded retries and exponential backoff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExecutor {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryExecutor {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay inserted after failed attempt `attempt` (1-based)
    ///
    /// Saturates instead of overflowing for large attempt numbers.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Run `op` until it succeeds, a non-retryable error occurs, the attempts
    /// run out, or `cancel` fires.
    ///
    /// `op` receives the 1-based attempt number. `retry_if` decides whether a
    /// failure is worth another attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Exhausted`] carrying the last error when no
    /// attempt succeeded, or [`RetryError::Cancelled`] if the token fired.
    pub async fn run<T, E, F, Fut, R>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
        retry_if: R,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled { attempts: attempt });
            }

            attempt += 1;

            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
                result = op(attempt) => result,
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= self.max_retries || !retry_if(&error) {
                return Err(RetryError::Exhausted {
                    error,
                    attempts: attempt,
                });
            }

            let delay = self.backoff_delay(attempt);
            debug!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Attempt failed, backing off before retry"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(RetryError::Cancelled { attempts: attempt }),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.base_delay_ms, 500);
    }

    #[test]
    fn test_backoff_delay() {
        let executor = RetryExecutor::new(5, Duration::from_millis(500));

        assert_eq!(executor.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(executor.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(executor.backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(executor.backoff_delay(4), Duration::from_millis(8_000));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        let executor = RetryExecutor::new(100, Duration::from_secs(1));

        assert!(executor.backoff_delay(40) >= executor.backoff_delay(31));
        let _ = RetryExecutor::new(100, Duration::MAX).backoff_delay(64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_has_no_delay() {
        let executor = RetryExecutor::new(3, Duration::from_millis(500));
        let start = Instant::now();

        let result: Result<u32, RetryError<String>> = executor
            .run(&CancellationToken::new(), |attempt| async move { Ok(attempt) }, |_| true)
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_double_between_attempts() {
        let executor = RetryExecutor::new(4, Duration::from_millis(100));
        let start = Instant::now();
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let result: Result<(), RetryError<String>> = executor
            .run(
                &CancellationToken::new(),
                |_| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().push(start.elapsed());
                        Err("unavailable".to_string())
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                error: "unavailable".to_string(),
                attempts: 4
            })
        );

        // Attempts at 0, +200, +400, +800
        assert_eq!(
            *seen.lock(),
            vec![
                Duration::ZERO,
                Duration::from_millis(200),
                Duration::from_millis(600),
                Duration::from_millis(1_400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let executor = RetryExecutor::new(3, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result: Result<&str, RetryError<String>> = executor
            .run(
                &CancellationToken::new(),
                |_| {
                    let call = calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if call < 2 {
                            Err(format!("failure {call}"))
                        } else {
                            Ok("delivered")
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok("delivered"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let executor = RetryExecutor::new(5, Duration::from_millis(10));
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> = executor
            .run(
                &CancellationToken::new(),
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("permanent".to_string()) }
                },
                |error| error != "permanent",
            )
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                error: "permanent".to_string(),
                attempts: 1
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let executor = RetryExecutor::new(5, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                cancel.cancel();
            })
        };

        let result: Result<(), RetryError<String>> = executor
            .run(&cancel, |_| async { Err("down".to_string()) }, |_| true)
            .await;

        canceller.await.unwrap();
        assert_eq!(result, Err(RetryError::Cancelled { attempts: 1 }));
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_calls_op() {
        let executor = RetryExecutor::new(3, Duration::from_millis(1));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> = executor
            .run(
                &cancel,
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err(RetryError::Cancelled { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
