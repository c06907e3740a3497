//! Types shared by every courier crate
//!
//! - [`Message`]: the opaque payload handed to delivery providers
//! - [`RequestId`]: the caller supplied idempotency key
//! - [`logging`]: subscriber bootstrap and the `internal!` log macros

pub mod logging;
pub mod message;
pub mod request_id;

pub use message::Message;
pub use request_id::RequestId;
pub use tracing;
