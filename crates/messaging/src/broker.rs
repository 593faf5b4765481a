//! Broker port shared by the outbox relay and the dispatch consumer.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_core::Stream;

use crate::Result;

/// A message to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub exchange: String,
    pub routing_key: String,
    /// Stable identity downstream consumers deduplicate on.
    pub message_id: String,
    /// Type discriminator of the payload.
    pub message_type: String,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Removes the message from the queue.
    async fn ack(&self) -> Result<()>;

    /// Rejects the message, optionally returning it to the queue.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message received from a queue, awaiting ACK or NACK.
pub struct Delivery {
    pub body: Vec<u8>,
    pub message_id: Option<String>,
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        body: Vec<u8>,
        message_id: Option<String>,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            body,
            message_id,
            redelivered,
            acker,
        }
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message_id)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// A stream of deliveries from a subscription.
///
/// An `Err` item means the subscription is broken and must be re-established.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery>> + Send>>;

/// Opens channels to the broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Opens a new connection and channel owned by the caller.
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>>;
}

/// A single connection-bound channel.
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Returns true while both the connection and the channel are usable.
    fn is_open(&self) -> bool;

    /// Publishes a persistent message and waits for the broker to accept it.
    async fn publish(&self, message: OutgoingMessage) -> Result<()>;

    /// Starts a manually acknowledged subscription with at most `prefetch`
    /// unacknowledged deliveries in flight.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream>;

    /// Closes the channel and its connection.
    async fn close(&self) -> Result<()>;
}

#[async_trait]
impl<T> Broker for Arc<T>
where
    T: Broker + ?Sized,
{
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        (**self).connect().await
    }
}
