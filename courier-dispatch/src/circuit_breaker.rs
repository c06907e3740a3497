//! Per-provider circuit breaker
//!
//! Stops routing attempts to a provider that keeps failing, giving it a
//! cooldown period before it is tried again.
//!
//! # Evaluation
//!
//! There is no stored state flag. Whether the circuit is open is computed on
//! every call from the failure count, the instant of the last failure and the
//! current time:
//!
//! ```text
//! open  ⇔  failures ≥ threshold  ∧  now − last_failure < cooldown
//! ```
//!
//! Once the cooldown has elapsed the next attempt is let through as if the
//! circuit were fully closed. Failures are never forgotten by time alone; only
//! a successful attempt ([`CircuitBreaker::reset`]) clears the count, so a
//! provider that fails again right after its cooldown is immediately reopened.
//!
//! # Example
//!
//! ```text
//! Threshold: 3 failures
//! Cooldown: 30 seconds
//!
//! t=0s:   3rd failure → open
//! t=0-30s: provider skipped
//! t=30s:  allowed again (failures still 3)
//! t=31s:  fails → open for another 30s
//!   or
//! t=31s:  succeeds → reset, failures 0
//! ```

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

/// Configuration for circuit breaker behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Number of failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the circuit stays open after the last failure (milliseconds)
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Per-provider overrides, keyed by provider name
    #[serde(default)]
    pub provider_overrides: ahash::AHashMap<String, ProviderBreakerConfig>,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_ms: default_cooldown_ms(),
            provider_overrides: ahash::AHashMap::default(),
        }
    }
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_ms() -> u64 {
    30_000
}

/// Per-provider circuit breaker override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl CircuitBreakerConfig {
    /// Effective settings for `provider`, honouring any override
    #[must_use]
    pub fn for_provider(&self, provider: &str) -> ProviderBreakerConfig {
        self.provider_overrides
            .get(provider)
            .copied()
            .unwrap_or(ProviderBreakerConfig {
                failure_threshold: self.failure_threshold,
                cooldown_ms: self.cooldown_ms,
            })
    }
}

/// Observed circuit state, derived on demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Attempts are routed to the provider
    Closed,
    /// Provider is skipped for the `remaining` part of its cooldown
    Open { remaining: Duration },
}

/// Openness as a pure function of the breaker's inputs
#[must_use]
pub fn evaluate(
    failures: u32,
    last_failure: Option<Instant>,
    now: Instant,
    threshold: u32,
    cooldown: Duration,
) -> CircuitState {
    match last_failure {
        Some(last) if failures >= threshold => {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < cooldown {
                CircuitState::Open {
                    remaining: cooldown - elapsed,
                }
            } else {
                CircuitState::Closed
            }
        }
        _ => CircuitState::Closed,
    }
}

#[derive(Debug, Default)]
struct CircuitBreakerData {
    failure_count: u32,
    last_failure_at: Option<Instant>,
}

/// Failure tracking gate for a single provider
#[derive(Debug)]
pub struct CircuitBreaker {
    provider: Arc<str>,
    threshold: u32,
    cooldown: Duration,
    data: parking_lot::Mutex<CircuitBreakerData>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(provider: impl Into<Arc<str>>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            provider: provider.into(),
            threshold,
            cooldown,
            data: parking_lot::Mutex::new(CircuitBreakerData::default()),
        }
    }

    #[must_use]
    pub fn from_config(provider: impl Into<Arc<str>>, config: &CircuitBreakerConfig) -> Self {
        let provider = provider.into();
        let settings = config.for_provider(&provider);
        Self::new(
            provider,
            settings.failure_threshold,
            Duration::from_millis(settings.cooldown_ms),
        )
    }

    /// Current state of the circuit
    pub fn state(&self) -> CircuitState {
        let data = self.data.lock();
        evaluate(
            data.failure_count,
            data.last_failure_at,
            Instant::now(),
            self.threshold,
            self.cooldown,
        )
    }

    /// Returns `true` if an attempt should be routed to this provider
    pub fn allow(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    /// Record a failed attempt (retries already exhausted)
    ///
    /// Returns `true` if this failure opened the circuit
    pub fn record_failure(&self) -> bool {
        let mut data = self.data.lock();
        let now = Instant::now();
        let was_open = matches!(
            evaluate(
                data.failure_count,
                data.last_failure_at,
                now,
                self.threshold,
                self.cooldown
            ),
            CircuitState::Open { .. }
        );

        data.failure_count = data.failure_count.saturating_add(1);
        data.last_failure_at = Some(now);
        let failure_count = data.failure_count;
        drop(data);

        let opened = !was_open && failure_count >= self.threshold;
        if opened {
            warn!(
                provider = %self.provider,
                failure_count,
                threshold = self.threshold,
                cooldown_ms = u64::try_from(self.cooldown.as_millis()).unwrap_or(u64::MAX),
                "Circuit breaker OPENED - skipping provider until cooldown elapses"
            );
        }

        opened
    }

    /// Forget all recorded failures after a successful attempt
    pub fn reset(&self) {
        let mut data = self.data.lock();
        let previous = std::mem::take(&mut data.failure_count);
        drop(data);

        if previous > 0 {
            info!(
                provider = %self.provider,
                previous_failures = previous,
                "Circuit breaker reset after successful delivery"
            );
        }
    }

    /// Get statistics for this provider (for monitoring/debugging)
    pub fn stats(&self) -> CircuitBreakerStats {
        let data = self.data.lock();
        let now = Instant::now();
        CircuitBreakerStats {
            state: evaluate(
                data.failure_count,
                data.last_failure_at,
                now,
                self.threshold,
                self.cooldown,
            ),
            failure_count: data.failure_count,
            since_last_failure: data
                .last_failure_at
                .map(|last| now.saturating_duration_since(last)),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerStats {
    /// Current circuit state
    pub state: CircuitState,
    /// Failures recorded since the last reset
    pub failure_count: u32,
    /// Time elapsed since the most recent failure
    pub since_last_failure: Option<Duration>,
}
