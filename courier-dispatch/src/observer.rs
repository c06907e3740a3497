//! Failure reporting hook
//!
//! Every time a provider exhausts its retries the orchestrator hands a
//! [`FailureEvent`] to its [`DispatchObserver`]. Observers are synchronous and
//! infallible: they run inline on the dispatch path and must never block it.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use courier_common::RequestId;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// A provider that gave up on a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEvent {
    pub provider: Arc<str>,
    pub request_id: RequestId,
    /// Display form of the last error
    pub error: String,
    /// Attempts made on this provider
    pub attempts: u32,
}

/// Receives provider failure events
pub trait DispatchObserver: Send + Sync {
    fn provider_failed(&self, event: &FailureEvent);
}

/// Logs each failure at WARN
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn provider_failed(&self, event: &FailureEvent) {
        warn!(
            provider = %event.provider,
            request_id = %event.request_id,
            attempts = event.attempts,
            error = %event.error,
            "Provider exhausted retries"
        );
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {
    fn provider_failed(&self, _event: &FailureEvent) {}
}

/// Forwards events into a bounded channel
///
/// Uses `try_send`, so a full or closed channel drops the event instead of
/// stalling the dispatch. Dropped events are counted.
#[derive(Debug)]
pub struct ChannelObserver {
    sender: mpsc::Sender<FailureEvent>,
    dropped: AtomicU64,
}

impl ChannelObserver {
    /// Create an observer and the receiving half of its channel
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<FailureEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::from_sender(sender), receiver)
    }

    #[must_use]
    pub const fn from_sender(sender: mpsc::Sender<FailureEvent>) -> Self {
        Self {
            sender,
            dropped: AtomicU64::new(0),
        }
    }

    /// Events discarded because the channel was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl DispatchObserver for ChannelObserver {
    fn provider_failed(&self, event: &FailureEvent) {
        if let Err(error) = self.sender.try_send(event.clone()) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                provider = %event.provider,
                request_id = %event.request_id,
                %error,
                "Dropping failure event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(provider: &str) -> FailureEvent {
        FailureEvent {
            provider: Arc::from(provider),
            request_id: RequestId::new("req-1"),
            error: "Connection failed: refused".to_string(),
            attempts: 3,
        }
    }

    #[tokio::test]
    async fn test_channel_observer_forwards_events() {
        let (observer, mut receiver) = ChannelObserver::new(4);

        observer.provider_failed(&event("primary"));
        observer.provider_failed(&event("backup"));

        assert_eq!(receiver.recv().await, Some(event("primary")));
        assert_eq!(receiver.recv().await, Some(event("backup")));
        assert_eq!(observer.dropped(), 0);
    }

    #[test]
    fn test_channel_observer_drops_when_full() {
        let (observer, _receiver) = ChannelObserver::new(1);

        observer.provider_failed(&event("primary"));
        observer.provider_failed(&event("primary"));
        observer.provider_failed(&event("primary"));

        assert_eq!(observer.dropped(), 2);
    }

    #[test]
    fn test_channel_observer_drops_when_closed() {
        let (observer, receiver) = ChannelObserver::new(8);
        drop(receiver);

        observer.provider_failed(&event("primary"));
        assert_eq!(observer.dropped(), 1);
    }

    #[test]
    fn test_failure_event_serializes() {
        let json = ron::to_string(&event("primary")).unwrap();
        assert!(json.contains("provider:\"primary\""));
        assert!(json.contains("request_id:\"req-1\""));
        assert!(json.contains("attempts:3"));
    }
}
