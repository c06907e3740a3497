//! The dispatch orchestrator
//!
//! Composes admission control, idempotency, circuit breaking, retry and
//! provider fallback into a single `send` operation:
//!
//! ```text
//! send(message, id)
//!   ├─ rate limiter rejects        → RateLimited
//!   ├─ id already delivered        → Duplicate
//!   ├─ id owned by another send    → wait, return the owner's outcome
//!   └─ for each provider, in order
//!        ├─ circuit open           → skip
//!        ├─ retry run succeeds     → reset breaker, Sent(provider)
//!        └─ retries exhausted      → report, record breaker failure, next
//!      none left                   → AllFailed
//! ```
//!
//! Provider errors never reach the caller. Every call ends in an [`Outcome`]
//! and every outcome is written to the [`StatusStore`].

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use courier_common::{Message, RequestId, internal};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    circuit_breaker::CircuitBreaker,
    config::DispatchConfig,
    error::{ConfigError, ProviderError, RetryError},
    observer::{DispatchObserver, FailureEvent, NoopObserver},
    provider::Provider,
    rate_limiter::{RateLimitStats, RateLimiter},
    retry::RetryExecutor,
    status::{Admission, StatusStore},
    types::{DispatchStats, Outcome, ProviderStats},
};

/// A provider paired with the breaker guarding it
struct Route {
    name: Arc<str>,
    provider: Arc<dyn Provider>,
    breaker: CircuitBreaker,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    sent: AtomicU64,
    rate_limited: AtomicU64,
    duplicate: AtomicU64,
    all_failed: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn count(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Sent(_) => &self.sent,
            Outcome::RateLimited => &self.rate_limited,
            Outcome::Duplicate => &self.duplicate,
            Outcome::AllFailed => &self.all_failed,
            Outcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            duplicate: self.duplicate.load(Ordering::Relaxed),
            all_failed: self.all_failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Sends messages through an ordered list of fallback providers
///
/// Shareable between any number of concurrent callers, usually behind an
/// `Arc`. All state lives in the instance.
pub struct DispatchOrchestrator {
    routes: Box<[Route]>,
    rate_limiter: RateLimiter,
    status: StatusStore,
    retry: RetryExecutor,
    observer: Arc<dyn DispatchObserver>,
    provider_timeout: Option<Duration>,
    counters: Counters,
}

impl fmt::Debug for DispatchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOrchestrator")
            .field(
                "providers",
                &self.routes.iter().map(|r| &*r.name).collect::<Vec<_>>(),
            )
            .field("rate_limiter", &self.rate_limiter)
            .field("retry", &self.retry)
            .field("provider_timeout", &self.provider_timeout)
            .field("stats", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl DispatchOrchestrator {
    #[must_use]
    pub fn builder() -> DispatchOrchestratorBuilder {
        DispatchOrchestratorBuilder::default()
    }

    /// Build an orchestrator over `providers`, in priority order
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the configuration does not validate
    /// against the provider names.
    pub fn new(
        providers: Vec<Arc<dyn Provider>>,
        config: DispatchConfig,
    ) -> Result<Self, ConfigError> {
        Self::builder()
            .providers(providers)
            .config(config)
            .build()
    }

    /// Send `message` at most once successfully for `id`
    pub async fn send(&self, message: &Message, id: &RequestId) -> Outcome {
        self.send_with_cancel(message, id, &CancellationToken::new())
            .await
    }

    /// Like [`send`](Self::send), abandoning the provider chain once `cancel` fires
    ///
    /// A cancelled send records [`Outcome::Cancelled`], leaves the id free for
    /// a later send and counts no breaker failure.
    pub async fn send_with_cancel(
        &self,
        message: &Message,
        id: &RequestId,
        cancel: &CancellationToken,
    ) -> Outcome {
        let outcome = self.dispatch(message, id, cancel).await;
        self.counters.count(&outcome);
        outcome
    }

    /// Like [`send`](Self::send), cancelling once `timeout` has elapsed
    pub async fn send_timeout(
        &self,
        message: &Message,
        id: &RequestId,
        timeout: Duration,
    ) -> Outcome {
        let cancel = CancellationToken::new();
        let mut dispatch = std::pin::pin!(self.send_with_cancel(message, id, &cancel));

        tokio::select! {
            outcome = &mut dispatch => outcome,
            () = tokio::time::sleep(timeout) => {
                debug!(
                    request_id = %id,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Send deadline elapsed, cancelling"
                );
                cancel.cancel();
                dispatch.await
            }
        }
    }

    /// Last recorded outcome for `id`
    ///
    /// While a send owns `id` this is the outcome of the previous send, if
    /// any. Callers that give up waiting on an in-flight send do not overwrite
    /// it; the owner records the result when it finishes.
    pub fn get_status(&self, id: &RequestId) -> Option<Outcome> {
        self.status.lookup(id)
    }

    pub const fn status_store(&self) -> &StatusStore {
        &self.status
    }

    /// Outcome counters since construction
    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Breaker state of every provider, in priority order
    pub fn provider_stats(&self) -> Vec<ProviderStats> {
        self.routes
            .iter()
            .enumerate()
            .map(|(priority, route)| ProviderStats {
                name: route.name.clone(),
                priority,
                breaker: route.breaker.stats(),
            })
            .collect()
    }

    pub fn rate_limit_stats(&self) -> RateLimitStats {
        self.rate_limiter.stats()
    }

    async fn dispatch(
        &self,
        message: &Message,
        id: &RequestId,
        cancel: &CancellationToken,
    ) -> Outcome {
        if cancel.is_cancelled() {
            self.status.record(id, Outcome::Cancelled);
            return Outcome::Cancelled;
        }

        if !self.rate_limiter.allow() {
            info!(request_id = %id, "Request rejected by rate limiter");
            self.status.record(id, Outcome::RateLimited);
            return Outcome::RateLimited;
        }

        loop {
            match self.status.reserve(id) {
                Admission::AlreadySent(provider) => {
                    info!(
                        request_id = %id,
                        provider = %provider,
                        "Request already delivered, skipping"
                    );
                    self.status.record(id, Outcome::Duplicate);
                    return Outcome::Duplicate;
                }
                Admission::InFlight(waiter) => {
                    debug!(request_id = %id, "Request in flight elsewhere, waiting for its outcome");

                    let owner_outcome = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            // The owner records the outcome of a send still in flight
                            if !self.status.is_in_flight(id) {
                                self.status.record(id, Outcome::Cancelled);
                            }
                            return Outcome::Cancelled;
                        }
                        outcome = waiter.wait() => outcome,
                    };

                    if let Some(outcome) = owner_outcome {
                        return outcome;
                    }

                    debug!(request_id = %id, "In-flight send was abandoned, retrying reservation");
                }
                Admission::Reserved(reservation) => {
                    let outcome = self.route(message, id, cancel).await;
                    if outcome.is_sent() {
                        self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    if outcome == Outcome::Cancelled {
                        reservation.abandon(Outcome::Cancelled);
                    } else {
                        reservation.complete(outcome.clone());
                    }
                    return outcome;
                }
            }
        }
    }

    /// Walk the provider chain until one delivers
    async fn route(&self, message: &Message, id: &RequestId, cancel: &CancellationToken) -> Outcome {
        let mut skipped = 0_usize;

        for route in &self.routes {
            if !route.breaker.allow() {
                debug!(
                    request_id = %id,
                    provider = %route.name,
                    "Circuit open, skipping provider"
                );
                skipped += 1;
                continue;
            }

            let result = self
                .retry
                .run(
                    cancel,
                    |attempt| self.attempt(route, message, id, attempt),
                    ProviderError::is_transient,
                )
                .await;

            match result {
                Ok(()) => {
                    route.breaker.reset();
                    info!(
                        request_id = %id,
                        provider = %route.name,
                        "Message sent"
                    );
                    return Outcome::Sent(route.name.clone());
                }
                Err(RetryError::Cancelled { attempts }) => {
                    info!(
                        request_id = %id,
                        provider = %route.name,
                        attempts,
                        "Send cancelled"
                    );
                    return Outcome::Cancelled;
                }
                Err(RetryError::Exhausted { error, attempts }) => {
                    warn!(
                        request_id = %id,
                        provider = %route.name,
                        attempts,
                        error = %error,
                        "Provider failed, falling back to next provider"
                    );

                    self.observer.provider_failed(&FailureEvent {
                        provider: route.name.clone(),
                        request_id: id.clone(),
                        error: error.to_string(),
                        attempts,
                    });
                    route.breaker.record_failure();
                }
            }
        }

        warn!(
            request_id = %id,
            providers = self.routes.len(),
            skipped_open_circuits = skipped,
            "All providers failed"
        );
        Outcome::AllFailed
    }

    async fn attempt(
        &self,
        route: &Route,
        message: &Message,
        id: &RequestId,
        attempt: u32,
    ) -> Result<(), ProviderError> {
        debug!(
            request_id = %id,
            provider = %route.name,
            attempt,
            "Attempting delivery"
        );

        match self.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, route.provider.send_message(message))
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout(limit))),
            None => route.provider.send_message(message).await,
        }
    }
}

/// Collects providers, configuration and an observer for a [`DispatchOrchestrator`]
#[derive(Default)]
pub struct DispatchOrchestratorBuilder {
    providers: Vec<Arc<dyn Provider>>,
    config: DispatchConfig,
    observer: Option<Arc<dyn DispatchObserver>>,
}

impl DispatchOrchestratorBuilder {
    /// Append a provider; earlier providers are preferred
    #[must_use]
    pub fn provider(mut self, provider: impl Provider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    #[must_use]
    pub fn provider_arc(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    #[must_use]
    pub fn providers(mut self, providers: impl IntoIterator<Item = Arc<dyn Provider>>) -> Self {
        self.providers.extend(providers);
        self
    }

    #[must_use]
    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive a [`FailureEvent`] whenever a provider exhausts its retries
    ///
    /// Without one, events are discarded; the orchestrator logs each failure
    /// regardless.
    #[must_use]
    pub fn observer(mut self, observer: impl DispatchObserver + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    #[must_use]
    pub fn observer_arc(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Validate the configuration and wire up one breaker per provider
    ///
    /// # Errors
    ///
    /// See [`DispatchConfig::validate`].
    pub fn build(self) -> Result<DispatchOrchestrator, ConfigError> {
        let Self {
            providers,
            config,
            observer,
        } = self;

        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        config.validate(&names)?;

        let routes: Box<[Route]> = providers
            .iter()
            .map(|provider| {
                let name: Arc<str> = Arc::from(provider.name());
                Route {
                    breaker: CircuitBreaker::from_config(name.clone(), &config.circuit_breaker),
                    name,
                    provider: provider.clone(),
                }
            })
            .collect();

        internal!(
            level = DEBUG,
            "Dispatch orchestrator built with {} provider(s): {:?}",
            routes.len(),
            names
        );

        Ok(DispatchOrchestrator {
            routes,
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            status: StatusStore::new(),
            retry: RetryExecutor::from_config(&config.retry),
            observer: observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            provider_timeout: config.provider_timeout(),
            counters: Counters::default(),
        })
    }
}

impl fmt::Debug for DispatchOrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOrchestratorBuilder")
            .field(
                "providers",
                &self.providers.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
