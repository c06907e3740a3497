//! Global admission control using a sliding window log
//!
//! The limiter remembers the instant of every admitted request that still
//! falls inside the trailing window. A request is admitted while fewer than
//! `limit` instants remain after pruning.
//!
//! # Example
//!
//! ```text
//! Rate limit: 3 requests per 1000ms
//!
//! t=0ms    allow() → true   window [0]
//! t=100ms  allow() → true   window [0, 100]
//! t=200ms  allow() → true   window [0, 100, 200]
//! t=300ms  allow() → false  window unchanged, rejection consumes nothing
//! t=1000ms allow() → true   0 pruned, window [100, 200, 1000]
//! ```

use std::{collections::VecDeque, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

/// Configuration for the admission gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests admitted within one window
    ///
    /// `0` rejects everything.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Length of the trailing window in milliseconds
    ///
    /// `0` keeps no history, so every request is admitted.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            interval_ms: default_interval_ms(),
        }
    }
}

const fn default_limit() -> u32 {
    100
}

const fn default_interval_ms() -> u64 {
    1000
}

/// Sliding window rate limiter shared by every `send`
#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    interval: Duration,
    window: parking_lot::Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: u32, interval: Duration) -> Self {
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Self {
            limit,
            interval,
            window: parking_lot::Mutex::new(VecDeque::with_capacity(limit.min(1024))),
        }
    }

    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, Duration::from_millis(config.interval_ms))
    }

    /// Try to admit one request
    ///
    /// Pruning and appending happen under a single lock, so two concurrent
    /// callers can never both take the last free slot.
    pub fn allow(&self) -> bool {
        if self.limit == 0 {
            return false;
        }

        if self.interval.is_zero() {
            return true;
        }

        let now = Instant::now();
        let mut window = self.window.lock();

        while window
            .front()
            .is_some_and(|admitted| now.duration_since(*admitted) >= self.interval)
        {
            window.pop_front();
        }

        if window.len() < self.limit {
            window.push_back(now);
            true
        } else {
            let retry_in = window
                .front()
                .map_or(Duration::ZERO, |oldest| {
                    self.interval.saturating_sub(now.duration_since(*oldest))
                });
            drop(window);
            debug!(
                limit = self.limit,
                retry_in_ms = u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded, rejecting request"
            );
            false
        }
    }

    /// Current window occupancy (for monitoring/debugging)
    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let window = self.window.lock();
        let in_window = window
            .iter()
            .filter(|admitted| now.duration_since(**admitted) < self.interval)
            .count();

        RateLimitStats {
            in_window,
            limit: self.limit,
            interval: self.interval,
        }
    }
}

/// Snapshot of the limiter's window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Admissions still inside the trailing window
    pub in_window: usize,
    /// Maximum admissions per window
    pub limit: usize,
    /// Window length
    pub interval: Duration,
}
