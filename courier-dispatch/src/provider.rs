//! Delivery provider abstraction
//!
//! A provider is one external channel able to attempt delivery of a single
//! message (an HTTP email API, an SMTP relay, an SMS gateway, ...). The
//! orchestrator only ever sees providers through this trait, so concrete
//! transports live outside this crate.

use async_trait::async_trait;
use courier_common::Message;

use crate::error::ProviderError;

/// One interchangeable delivery back-end
///
/// Implementations must be safe to call from many tasks at once; the
/// orchestrator shares a single instance between every concurrent `send`.
///
/// # Example
///
/// ```rust,ignore
/// struct Console;
///
/// #[async_trait]
/// impl Provider for Console {
///     fn name(&self) -> &str {
///         "console"
///     }
///
///     async fn send_message(&self, message: &Message) -> Result<(), ProviderError> {
///         println!("to={} subject={}", message.recipient(), message.subject());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Unique, stable name used in outcomes, logs and configuration overrides
    fn name(&self) -> &str;

    /// Make a single delivery attempt
    ///
    /// # Errors
    ///
    /// Any failure of this attempt. [`ProviderError::Rejected`] tells the
    /// orchestrator not to retry the message on this provider.
    async fn send_message(&self, message: &Message) -> Result<(), ProviderError>;
}
