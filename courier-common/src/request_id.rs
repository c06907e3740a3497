//! Request identifier newtype
//!
//! Wraps the caller supplied idempotency key so it can't be confused with
//! provider names or recipient addresses. Cloning is a reference count bump.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Idempotency key for a single logical send
///
/// Two `send` calls carrying equal identifiers describe the same logical
/// request and will never both reach a provider successfully.
///
/// # Examples
///
/// ```
/// use courier_common::RequestId;
///
/// let id = RequestId::new("order-1234/receipt");
/// assert_eq!(id.as_str(), "order-1234/receipt");
///
/// let id: RequestId = "welcome-mail".into();
/// assert_eq!(id.as_str(), "welcome-mail");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// Create a new `RequestId` from anything convertible to `Arc<str>`
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    /// Generate a fresh, lexicographically sortable identifier
    ///
    /// For callers that have no natural idempotency key of their own. Each
    /// call yields a distinct id, so retrying with a *new* generated id is a
    /// new logical request.
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(ulid::Ulid::new().to_string()))
    }

    /// Get the identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> Arc<str> {
        self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RequestId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for RequestId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<Arc<str>> for RequestId {
    fn from(s: Arc<str>) -> Self {
        Self(s)
    }
}

impl From<RequestId> for Arc<str> {
    fn from(id: RequestId) -> Self {
        id.0
    }
}
