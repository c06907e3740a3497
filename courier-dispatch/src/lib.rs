//! Resilient multi-provider message dispatch
//!
//! This crate provides:
//! - A sliding-window [`RateLimiter`] for admission control
//! - A per-provider [`CircuitBreaker`]
//! - A [`RetryExecutor`] with bounded exponential backoff
//! - A [`StatusStore`] enforcing at-most-once successful delivery per [`RequestId`]
//! - The [`DispatchOrchestrator`] that composes them over an ordered list of
//!   [`Provider`]s
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = DispatchOrchestrator::builder()
//!     .provider(PrimaryApi::new(..))
//!     .provider(SmtpRelay::new(..))
//!     .config(DispatchConfig::load("dispatch.ron")?)
//!     .build()?;
//!
//! match orchestrator.send(&message, &RequestId::new("order-1234")).await {
//!     Outcome::Sent(provider) => println!("delivered via {provider}"),
//!     other => println!("not delivered: {other}"),
//! }
//! ```

pub mod circuit_breaker;
mod config;
mod error;
mod observer;
mod orchestrator;
mod provider;
pub mod rate_limiter;
pub mod retry;
mod status;
mod types;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState,
    ProviderBreakerConfig,
};
pub use config::DispatchConfig;
pub use courier_common::{Message, RequestId};
pub use error::{ConfigError, ProviderError, RetryError};
pub use observer::{ChannelObserver, DispatchObserver, FailureEvent, NoopObserver, TracingObserver};
pub use orchestrator::{DispatchOrchestrator, DispatchOrchestratorBuilder};
pub use provider::Provider;
pub use rate_limiter::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use retry::{RetryConfig, RetryExecutor};
pub use status::{Admission, InFlight, Reservation, StatusStore};
pub use types::{DispatchStats, Outcome, ProviderStats};
// Providers implement `Provider` with `#[async_trait]`
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
