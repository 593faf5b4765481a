//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Serialize, de::DeserializeOwned};

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the identity of this event occurrence.
    fn event_id(&self) -> EventId;

    /// Returns the fully-qualified event type name.
    ///
    /// Persisted as the outbox type discriminator and published as the
    /// message type header.
    fn event_type(&self) -> &'static str;

    /// Returns when the event occurred (UTC).
    fn occurred_on(&self) -> DateTime<Utc>;
}

/// Trait for aggregate roots that record domain events.
///
/// Mutations push events onto an internal list; the unit of work drains
/// that list when the aggregate is committed so every event is persisted
/// in the same transaction as the state change that produced it.
pub trait AggregateRoot: Send + Sync {
    /// The identifier type of this aggregate.
    type Id: Copy + std::fmt::Display;

    /// The type of events this aggregate records.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's identifier.
    fn id(&self) -> Self::Id;

    /// Returns events recorded since the last drain.
    fn pending_events(&self) -> &[Self::Event];

    /// Removes and returns the events recorded since the last drain.
    fn take_events(&mut self) -> Vec<Self::Event>;

    /// Returns true if there are events waiting to be committed.
    fn has_pending_events(&self) -> bool {
        !self.pending_events().is_empty()
    }
}
