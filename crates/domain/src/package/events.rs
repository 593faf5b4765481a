//! Package domain events.

use chrono::{DateTime, Utc};
use common::{DriverId, EventId, PackageId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{DeliveryStatus, IncidentType};

/// Events that can occur on a package aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PackageEvent {
    /// The delivery status (or incident details) of the package changed.
    DeliveryStatusChanged(DeliveryStatusChanged),
}

impl DomainEvent for PackageEvent {
    fn event_id(&self) -> EventId {
        match self {
            PackageEvent::DeliveryStatusChanged(data) => data.event_id,
        }
    }

    fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::DeliveryStatusChanged(_) => DeliveryStatusChanged::EVENT_TYPE,
        }
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        match self {
            PackageEvent::DeliveryStatusChanged(data) => data.occurred_on,
        }
    }
}

/// Snapshot of a package taken right after a status mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusChanged {
    /// Identity of this event occurrence; reused as the outbox message id.
    pub event_id: EventId,

    /// When the mutation happened.
    pub occurred_on: DateTime<Utc>,

    pub package_id: PackageId,
    pub driver_id: DriverId,
    pub number: String,
    pub delivery_status: DeliveryStatus,
    pub incident_type: Option<IncidentType>,
    pub incident_description: Option<String>,
    pub delivery_evidence: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeliveryStatusChanged {
    /// Fully-qualified type discriminator persisted with outbox records.
    pub const EVENT_TYPE: &'static str = "domain::package::events::DeliveryStatusChanged";
}

/// Outbound integration message for a status change.
///
/// Every field is always present on the wire; absent values are `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangedPayload {
    pub package_id: PackageId,
    pub driver_id: DriverId,
    pub number: String,
    pub delivery_status: DeliveryStatus,
    pub incident_type: Option<IncidentType>,
    pub incident_description: Option<String>,
    pub delivery_evidence: Option<String>,
    pub occurred_on: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&DeliveryStatusChanged> for StatusChangedPayload {
    fn from(event: &DeliveryStatusChanged) -> Self {
        Self {
            package_id: event.package_id,
            driver_id: event.driver_id,
            number: event.number.clone(),
            delivery_status: event.delivery_status,
            incident_type: event.incident_type,
            incident_description: event.incident_description.clone(),
            delivery_evidence: event.delivery_evidence.clone(),
            occurred_on: event.occurred_on,
            updated_at: event.updated_at,
        }
    }
}
