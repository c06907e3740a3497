//! Request status tracking and idempotency reservations

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use courier_common::RequestId;
use dashmap::DashMap;
use tokio::sync::watch;

use crate::types::Outcome;

#[derive(Debug, Default)]
struct StatusRecord {
    /// Most recent terminal outcome
    last: Option<Outcome>,
    /// Provider that delivered this id; survives later overwrites of `last`
    delivered_by: Option<Arc<str>>,
    /// Reservation ticket and completion channel of the send that owns this id
    in_flight: Option<(u64, watch::Receiver<Option<Outcome>>)>,
}

/// Result of trying to reserve a request id
#[derive(Debug)]
pub enum Admission<'a> {
    /// The caller owns the id until the reservation is completed or dropped
    Reserved(Reservation<'a>),
    /// The id was already delivered by the named provider
    AlreadySent(Arc<str>),
    /// Another `send` owns the id right now
    InFlight(InFlight),
}

/// Maps request ids to their last known outcome
///
/// All mutation goes through the `DashMap` entry API, so the check-and-mark
/// in [`StatusStore::reserve`] is atomic per id.
#[derive(Debug, Default)]
pub struct StatusStore {
    records: DashMap<RequestId, StatusRecord>,
    next_ticket: AtomicU64,
}

impl StatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the last outcome for `id`
    ///
    /// A `Sent` outcome also marks the id as delivered. Never touches an
    /// in-flight reservation.
    pub fn record(&self, id: &RequestId, outcome: Outcome) {
        let mut record = self.records.entry(id.clone()).or_default();
        if let Outcome::Sent(provider) = &outcome {
            record.delivered_by = Some(provider.clone());
        }
        record.last = Some(outcome);
    }

    /// Last outcome recorded for `id`
    pub fn lookup(&self, id: &RequestId) -> Option<Outcome> {
        self.records.get(id).and_then(|record| record.last.clone())
    }

    /// Returns `true` if some earlier send of `id` succeeded
    pub fn was_sent(&self, id: &RequestId) -> bool {
        self.records
            .get(id)
            .is_some_and(|record| record.delivered_by.is_some())
    }

    pub fn is_in_flight(&self, id: &RequestId) -> bool {
        self.records
            .get(id)
            .is_some_and(|record| record.in_flight.is_some())
    }

    /// Atomically check whether `id` may be sent and, if so, mark it in flight
    pub fn reserve(&self, id: &RequestId) -> Admission<'_> {
        let mut record = self.records.entry(id.clone()).or_default();

        if let Some(provider) = &record.delivered_by {
            return Admission::AlreadySent(provider.clone());
        }

        if let Some((_, receiver)) = &record.in_flight {
            return Admission::InFlight(InFlight {
                receiver: receiver.clone(),
            });
        }

        let (sender, receiver) = watch::channel(None);
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        record.in_flight = Some((ticket, receiver));
        drop(record);

        Admission::Reserved(Reservation {
            store: self,
            id: id.clone(),
            ticket,
            sender,
            completed: false,
        })
    }

    /// Forget `id` unless a send currently owns it
    ///
    /// Returns the last outcome of the removed record.
    pub fn remove(&self, id: &RequestId) -> Option<Outcome> {
        self.records
            .remove_if(id, |_, record| record.in_flight.is_none())
            .and_then(|(_, record)| record.last)
    }

    /// All ids with a terminal outcome
    pub fn snapshot(&self) -> Vec<(RequestId, Outcome)> {
        self.records
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .last
                    .clone()
                    .map(|outcome| (entry.key().clone(), outcome))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn finish(&self, id: &RequestId, ticket: u64, outcome: &Outcome) {
        let mut record = self.records.entry(id.clone()).or_default();
        if let Outcome::Sent(provider) = outcome {
            record.delivered_by = Some(provider.clone());
        }
        record.last = Some(outcome.clone());
        if record.in_flight.as_ref().is_some_and(|(t, _)| *t == ticket) {
            record.in_flight = None;
        }
    }
}

/// Exclusive claim on a request id
///
/// Complete it with the terminal outcome. Dropping it uncompleted (for
/// example when the caller's future is dropped) records
/// [`Outcome::Cancelled`] and releases the id so a later or waiting send may
/// claim it.
#[derive(Debug)]
pub struct Reservation<'a> {
    store: &'a StatusStore,
    id: RequestId,
    ticket: u64,
    sender: watch::Sender<Option<Outcome>>,
    completed: bool,
}

impl Reservation<'_> {
    pub fn id(&self) -> &RequestId {
        &self.id
    }

    /// Record `outcome`, release the id and wake every waiter
    pub fn complete(mut self, outcome: Outcome) {
        self.store.finish(&self.id, self.ticket, &outcome);
        self.sender.send_replace(Some(outcome));
        self.completed = true;
    }

    /// Record `outcome` and release the id without handing it to waiters
    ///
    /// Waiters wake empty-handed and race to reserve the id themselves.
    pub fn abandon(mut self, outcome: Outcome) {
        self.store.finish(&self.id, self.ticket, &outcome);
        self.completed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.store.finish(&self.id, self.ticket, &Outcome::Cancelled);
        }
    }
}

/// Handle on another send's reservation
#[derive(Debug)]
pub struct InFlight {
    receiver: watch::Receiver<Option<Outcome>>,
}

impl InFlight {
    /// Wait for the owning send to finish
    ///
    /// Returns `None` if the owner went away without completing, in which case
    /// the id is free to be reserved again.
    pub async fn wait(mut self) -> Option<Outcome> {
        match self.receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        }
    }
}
