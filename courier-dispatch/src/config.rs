//! Dispatch configuration
//!
//! Deserialised from RON; every field has a default so an empty `()` is a
//! complete configuration:
//!
//! ```ron
//! (
//!     rate_limit: (limit: 100, interval_ms: 1000),
//!     circuit_breaker: (
//!         failure_threshold: 3,
//!         cooldown_ms: 30000,
//!         provider_overrides: {
//!             "smtp-relay": (failure_threshold: 5, cooldown_ms: 60000),
//!         },
//!     ),
//!     retry: (max_retries: 3, base_delay_ms: 500),
//!     provider_timeout_ms: Some(30000),
//! )
//! ```

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    circuit_breaker::CircuitBreakerConfig, error::ConfigError, rate_limiter::RateLimitConfig,
    retry::RetryConfig,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Upper bound on a single provider attempt (milliseconds)
    ///
    /// `None` lets an attempt run for as long as the provider takes.
    ///
    /// Default: 30 seconds
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: Option<u64>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

const fn default_provider_timeout_ms() -> Option<u64> {
    Some(30_000)
}

impl DispatchConfig {
    /// Parse a RON document
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(source)?)
    }

    /// Read and parse a RON file
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file cannot be read, or
    /// [`ConfigError::Parse`] if its contents are not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron_str(&source)
    }

    #[must_use]
    pub fn provider_timeout(&self) -> Option<Duration> {
        self.provider_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration against the names of the providers it will drive
    ///
    /// # Errors
    ///
    /// Returns the first problem found: no providers, a repeated provider
    /// name, zero retries, a zero provider timeout, a zero failure threshold,
    /// or a breaker override for a provider that is not registered.
    pub fn validate(&self, providers: &[&str]) -> Result<(), ConfigError> {
        if providers.is_empty() {
            return Err(ConfigError::NoProviders);
        }

        let mut seen = ahash::AHashSet::with_capacity(providers.len());
        for name in providers {
            if !seen.insert(*name) {
                return Err(ConfigError::DuplicateProvider((*name).to_string()));
            }
        }

        if self.retry.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }

        if self.provider_timeout_ms == Some(0) {
            return Err(ConfigError::ZeroProviderTimeout);
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold("*".to_string()));
        }

        for (name, settings) in self.circuit_breaker.provider_overrides.iter() {
            if !seen.contains(name.as_str()) {
                return Err(ConfigError::UnknownProviderOverride(name.clone()));
            }
            if settings.failure_threshold == 0 {
                return Err(ConfigError::ZeroFailureThreshold(name.clone()));
            }
        }

        Ok(())
    }
}
