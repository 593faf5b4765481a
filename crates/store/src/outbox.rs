//! Outbox records written alongside package state changes.

use chrono::{DateTime, Utc};
use common::EventId;
use domain::{DomainEvent, PackageEvent, StatusChangedPayload};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Routing name of the integration event announcing a package status change.
pub const PACKAGE_STATUS_UPDATED_EVENT_NAME: &str = "logistica.paquete.estado-actualizado";

/// A pending (or processed) integration message.
///
/// Created in the same transaction as the state change that caused it and
/// later published by the outbox relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Identity of the message; equal to the originating domain event id.
    pub id: EventId,

    /// Logical event name, used as the broker routing key.
    pub event_name: String,

    /// Type discriminator of the originating domain event.
    pub message_type: String,

    /// Serialized integration payload (JSON text).
    pub content: String,

    /// When the originating event occurred.
    pub occurred_on_utc: DateTime<Utc>,

    /// Set once the message has been published successfully.
    pub processed_on_utc: Option<DateTime<Utc>>,

    /// Last publish failure, if any.
    pub error: Option<String>,
}

impl OutboxMessage {
    /// Maps a domain event to its outbox record.
    pub fn from_event(event: &PackageEvent) -> Result<Self> {
        let (event_name, content) = match event {
            PackageEvent::DeliveryStatusChanged(data) => (
                PACKAGE_STATUS_UPDATED_EVENT_NAME,
                serde_json::to_string(&StatusChangedPayload::from(data))?,
            ),
        };

        Ok(Self {
            id: event.event_id(),
            event_name: event_name.to_string(),
            message_type: event.event_type().to_string(),
            content,
            occurred_on_utc: event.occurred_on(),
            processed_on_utc: None,
            error: None,
        })
    }

    /// Returns true if the message still awaits publication.
    pub fn is_pending(&self) -> bool {
        self.processed_on_utc.is_none()
    }
}
