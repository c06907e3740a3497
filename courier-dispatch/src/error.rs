//! Typed error handling for dispatch operations
//!
//! Provider failures never reach the caller of `send`: they are recovered by
//! retry, converted into circuit breaker signals, or folded into a terminal
//! [`Outcome`](crate::Outcome). The only errors a caller sees are
//! configuration errors, raised while an orchestrator is being built.

use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Failure reported by a delivery provider for a single attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Could not reach the provider back-end
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The provider answered but is temporarily unable to accept work
    #[error("Provider busy: {0}")]
    Busy(String),

    /// The attempt did not finish within the per-attempt timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The provider refused this message; retrying it on the same provider
    /// will not help.
    #[error("Message rejected: {0}")]
    Rejected(String),
}

impl ProviderError {
    /// Returns `true` if another attempt on the same provider may succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

impl From<io::Error> for ProviderError {
    fn from(error: io::Error) -> Self {
        Self::ConnectionFailed(error.to_string())
    }
}

/// Why a [`RetryExecutor`](crate::RetryExecutor) run gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed, or the last error was not retryable
    #[error("Gave up after {attempts} attempt(s): {error}")]
    Exhausted { error: E, attempts: u32 },

    /// The caller's cancellation signal fired before an attempt succeeded
    #[error("Cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// Number of attempts that were started before giving up
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Invalid configuration, detected before any message is sent
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("At least one provider must be configured")]
    NoProviders,

    #[error("Provider name {0:?} is registered more than once")]
    DuplicateProvider(String),

    #[error("retry.max_retries must be at least 1")]
    ZeroRetries,

    #[error("provider_timeout_ms must be greater than 0; use None to disable the timeout")]
    ZeroProviderTimeout,

    #[error("Circuit breaker failure threshold for {0:?} must be at least 1")]
    ZeroFailureThreshold(String),

    #[error("Circuit breaker override names unknown provider {0:?}")]
    UnknownProviderOverride(String),

    #[error("Failed to read configuration from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_is_transient() {
        assert!(ProviderError::ConnectionFailed("refused".to_string()).is_transient());
        assert!(ProviderError::Busy("429".to_string()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ProviderError::Rejected("bad recipient".to_string()).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let error: ProviderError =
            io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused").into();

        assert!(error.is_transient());
        assert_eq!(error.to_string(), "Connection failed: connection refused");
    }

    #[test]
    fn test_retry_error_display() {
        let error = RetryError::Exhausted {
            error: ProviderError::Busy("try later".to_string()),
            attempts: 3,
        };
        assert_eq!(
            error.to_string(),
            "Gave up after 3 attempt(s): Provider busy: try later"
        );
        assert_eq!(error.attempts(), 3);

        let error = RetryError::<ProviderError>::Cancelled { attempts: 1 };
        assert_eq!(error.to_string(), "Cancelled after 1 attempt(s)");
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::DuplicateProvider("ses".to_string()).to_string(),
            "Provider name \"ses\" is registered more than once"
        );
        assert_eq!(
            ConfigError::NoProviders.to_string(),
            "At least one provider must be configured"
        );
    }
}
