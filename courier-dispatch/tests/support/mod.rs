//! Mock providers and observers for dispatch scenarios
//!
//! A [`MockProvider`] answers every attempt from a fixed behaviour, optionally
//! after a delay, and counts how often it was called.
#![allow(dead_code)] // Test utility module - not all helpers used in every test

use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use courier_dispatch::{
    DispatchConfig, DispatchObserver, FailureEvent, Message, Provider, ProviderError, async_trait,
};

#[derive(Debug, Clone)]
enum Behaviour {
    Succeed,
    Fail,
    Reject,
    /// Fail this many attempts, then succeed
    FailTimes(u32),
}

#[derive(Debug)]
pub struct MockProvider {
    name: String,
    behaviour: Behaviour,
    delay: Duration,
    calls: AtomicU32,
}

impl MockProvider {
    fn new(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::new(name, Behaviour::Succeed)
    }

    pub fn failing(name: &str) -> Self {
        Self::new(name, Behaviour::Fail)
    }

    pub fn rejecting(name: &str) -> Self {
        Self::new(name, Behaviour::Reject)
    }

    pub fn failing_times(name: &str, times: u32) -> Self {
        Self::new(name, Behaviour::FailTimes(times))
    }

    /// Sleep this long before answering each attempt
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_message(&self, _message: &Message) -> Result<(), ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match self.behaviour {
            Behaviour::Succeed => Ok(()),
            Behaviour::Fail => Err(ProviderError::ConnectionFailed(format!(
                "{} unreachable",
                self.name
            ))),
            Behaviour::Reject => Err(ProviderError::Rejected("recipient blocked".to_string())),
            Behaviour::FailTimes(times) if call < times => {
                Err(ProviderError::Busy(format!("{} busy", self.name)))
            }
            Behaviour::FailTimes(_) => Ok(()),
        }
    }
}

/// Keeps every failure event it is handed
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: parking_lot::Mutex<Vec<FailureEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<FailureEvent> {
        self.events.lock().clone()
    }
}

impl DispatchObserver for RecordingObserver {
    fn provider_failed(&self, event: &FailureEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Configuration with a generous rate limit and no per-attempt timeout
pub fn config(max_retries: u32, base_delay_ms: u64) -> DispatchConfig {
    let mut config = DispatchConfig::default();
    config.rate_limit.limit = 10_000;
    config.retry.max_retries = max_retries;
    config.retry.base_delay_ms = base_delay_ms;
    config.provider_timeout_ms = None;
    config
}

pub fn message() -> Message {
    Message::new("recipient@example.com", "Order confirmation").with_body("Thanks!")
}
