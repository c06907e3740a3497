//! Outbound message payload

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A message waiting to be handed to a delivery provider
///
/// The dispatch layer never looks inside; it only passes the message along.
/// Fields are reference counted so retries and provider fallbacks share one
/// allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    recipient: Arc<str>,
    subject: Arc<str>,
    #[serde(default)]
    body: Arc<str>,
    #[serde(default)]
    headers: Vec<(String, String)>,
}

impl Message {
    #[must_use]
    pub fn new(recipient: impl Into<Arc<str>>, subject: impl Into<Arc<str>>) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: Arc::from(""),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Arc<str>>) -> Self {
        self.body = body.into();
        self
    }

    /// Append a header; order of insertion is preserved
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header value matching `name`, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_message_builder() {
        let message = Message::new("user@example.com", "Welcome")
            .with_body("Hello there")
            .with_header("X-Campaign", "onboarding")
            .with_header("Reply-To", "support@example.com");

        assert_eq!(message.recipient(), "user@example.com");
        assert_eq!(message.subject(), "Welcome");
        assert_eq!(message.body(), "Hello there");
        assert_eq!(
            message.headers(),
            &[
                ("X-Campaign".to_string(), "onboarding".to_string()),
                ("Reply-To".to_string(), "support@example.com".to_string()),
            ]
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let message = Message::new("a@b.c", "s").with_header("X-Trace", "abc");

        assert_eq!(message.header("x-trace"), Some("abc"));
        assert_eq!(message.header("X-Missing"), None);
    }

    #[test]
    fn test_body_defaults_when_deserializing() {
        let message: Message =
            ron::from_str(r#"(recipient: "a@b.c", subject: "hi")"#).unwrap();

        assert_eq!(message, Message::new("a@b.c", "hi"));
    }
}
