//! Type definitions shared by the store and the orchestrator

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::circuit_breaker::CircuitBreakerStats;

/// Terminal result of a single `send`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// Delivered by the named provider
    Sent(Arc<str>),
    /// Rejected by admission control before any work was done
    RateLimited,
    /// The request id was already delivered; no provider was contacted
    Duplicate,
    /// Every provider failed or had an open circuit
    AllFailed,
    /// The caller's cancellation signal or deadline fired first
    Cancelled,
}

impl Outcome {
    #[must_use]
    pub fn sent(provider: impl Into<Arc<str>>) -> Self {
        Self::Sent(provider.into())
    }

    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }

    /// Provider that delivered the message, if any
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Sent(provider) => Some(provider),
            _ => None,
        }
    }

    /// Short, stable label for logs and counters
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Sent(_) => "sent",
            Self::RateLimited => "rate-limited",
            Self::Duplicate => "duplicate",
            Self::AllFailed => "all-failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent(provider) => write!(f, "sent({provider})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Counters since the orchestrator was built
///
/// The per-outcome fields count outcomes returned to callers, so concurrent
/// sends of one id that share a single delivery each add to `sent`.
/// `delivered` counts successful provider deliveries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub sent: u64,
    pub rate_limited: u64,
    pub duplicate: u64,
    pub all_failed: u64,
    pub cancelled: u64,
}

impl DispatchStats {
    /// Outcomes returned to callers
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.sent + self.rate_limited + self.duplicate + self.all_failed + self.cancelled
    }
}

/// Health of one provider route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStats {
    /// Provider name
    pub name: Arc<str>,
    /// Position in the fallback order (0 = most preferred)
    pub priority: usize,
    /// Circuit breaker snapshot
    pub breaker: CircuitBreakerStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::sent("ses").to_string(), "sent(ses)");
        assert_eq!(Outcome::RateLimited.to_string(), "rate-limited");
        assert_eq!(Outcome::Duplicate.to_string(), "duplicate");
        assert_eq!(Outcome::AllFailed.to_string(), "all-failed");
        assert_eq!(Outcome::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_outcome_provider() {
        assert_eq!(Outcome::sent("smtp").provider(), Some("smtp"));
        assert!(Outcome::sent("smtp").is_sent());
        assert_eq!(Outcome::AllFailed.provider(), None);
        assert!(!Outcome::Duplicate.is_sent());
    }

    #[test]
    fn test_stats_total() {
        let stats = DispatchStats {
            delivered: 3,
            sent: 3,
            rate_limited: 1,
            duplicate: 2,
            all_failed: 1,
            cancelled: 0,
        };
        assert_eq!(stats.total(), 7);
    }
}
