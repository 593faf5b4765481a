//! Delivery status state machine and incident classification.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::UnknownVariant;

/// The delivery status of a package.
///
/// State transitions:
/// ```text
/// Pending ──► InTransit ──┬──► Completed
///    │            │       └──► Failed ──► (incident registered, stays Failed)
///    │            │                │
///    └────────────┴────────────────┴──► Cancelled
/// ```
///
/// Completed is terminal: it cannot be cancelled or transitioned further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeliveryStatus {
    /// Created and waiting for route assignment.
    #[default]
    Pending,

    /// Out for delivery.
    InTransit,

    /// Delivered with evidence (terminal).
    Completed,

    /// The delivery attempt failed.
    Failed,

    /// The delivery was called off.
    Cancelled,
}

impl DeliveryStatus {
    /// All statuses in declaration order.
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::InTransit,
        DeliveryStatus::Completed,
        DeliveryStatus::Failed,
        DeliveryStatus::Cancelled,
    ];

    /// Returns true if the route position can still be changed.
    pub fn can_set_order(&self) -> bool {
        matches!(self, DeliveryStatus::Pending)
    }

    /// Returns true if the package can go out for delivery.
    pub fn can_start_transit(&self) -> bool {
        matches!(self, DeliveryStatus::Pending)
    }

    /// Returns true if the delivery can be completed.
    pub fn can_complete(&self) -> bool {
        matches!(self, DeliveryStatus::InTransit)
    }

    /// Returns true if the delivery can be marked failed.
    pub fn can_fail(&self) -> bool {
        matches!(self, DeliveryStatus::InTransit)
    }

    /// Returns true if the delivery can be cancelled.
    pub fn can_cancel(&self) -> bool {
        !matches!(self, DeliveryStatus::Completed)
    }

    /// Returns true if an incident can be recorded.
    pub fn can_register_incident(&self) -> bool {
        matches!(self, DeliveryStatus::Failed)
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "Pending",
            DeliveryStatus::InTransit => "InTransit",
            DeliveryStatus::Completed => "Completed",
            DeliveryStatus::Failed => "Failed",
            DeliveryStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(DeliveryStatus::Pending),
            "InTransit" => Ok(DeliveryStatus::InTransit),
            "Completed" => Ok(DeliveryStatus::Completed),
            "Failed" => Ok(DeliveryStatus::Failed),
            "Cancelled" => Ok(DeliveryStatus::Cancelled),
            other => Err(UnknownVariant::new("delivery status", other)),
        }
    }
}

impl Serialize for DeliveryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DeliveryStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Why a failed delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentType {
    PatientAbsent,
    IncorrectAddress,
    RefusedByReceiver,
    WeatherIssue,
    Other,
}

impl IncidentType {
    /// Returns the wire name of the incident type.
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentType::PatientAbsent => "PatientAbsent",
            IncidentType::IncorrectAddress => "IncorrectAddress",
            IncidentType::RefusedByReceiver => "RefusedByReceiver",
            IncidentType::WeatherIssue => "WeatherIssue",
            IncidentType::Other => "Other",
        }
    }
}

impl std::fmt::Display for IncidentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for IncidentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PatientAbsent" => Ok(IncidentType::PatientAbsent),
            "IncorrectAddress" => Ok(IncidentType::IncorrectAddress),
            "RefusedByReceiver" => Ok(IncidentType::RefusedByReceiver),
            "WeatherIssue" => Ok(IncidentType::WeatherIssue),
            "Other" => Ok(IncidentType::Other),
            other => Err(UnknownVariant::new("incident type", other)),
        }
    }
}

impl Serialize for IncidentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for IncidentType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
