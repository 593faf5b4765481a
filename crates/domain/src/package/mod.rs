//! Package aggregate and related types.

mod aggregate;
mod events;
mod status;

pub use aggregate::{NewPackage, Package, PackageRecord};
pub use events::{DeliveryStatusChanged, PackageEvent, StatusChangedPayload};
pub use status::{DeliveryStatus, IncidentType};

use thiserror::Error;

use crate::ErrorKind;

/// Errors raised by delivery status transitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// The delivery order must be positive.
    #[error("The delivery order must be greater than zero (got {order})")]
    InvalidOrderValue { order: i32 },

    /// The package is not in a status that allows the action.
    #[error("Invalid status transition: cannot {action} a package in {current} status")]
    InvalidStatusTransition {
        current: DeliveryStatus,
        action: &'static str,
    },

    /// Completed deliveries are final.
    #[error("A completed delivery cannot be cancelled")]
    CannotCancelCompletedDelivery,

    /// Incidents are only recorded against failed deliveries.
    #[error("An incident can only be registered on a failed delivery (current status: {current})")]
    CannotRegisterIncidentInCurrentStatus { current: DeliveryStatus },

    /// Completion requires proof of delivery.
    #[error("The delivery evidence is required")]
    DeliveryEvidenceIsRequired,

    /// An incident needs a description.
    #[error("The incident description is required")]
    IncidentDescriptionIsRequired,
}

impl DeliveryError {
    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::InvalidOrderValue { .. } => "Delivery.InvalidOrderValue",
            DeliveryError::InvalidStatusTransition { .. } => "Delivery.InvalidStatusTransition",
            DeliveryError::CannotCancelCompletedDelivery => "Delivery.CannotCancelDelivered",
            DeliveryError::CannotRegisterIncidentInCurrentStatus { .. } => {
                "Delivery.CannotRegisterIncident"
            }
            DeliveryError::DeliveryEvidenceIsRequired => "Delivery.DeliveryEvidenceIsRequired",
            DeliveryError::IncidentDescriptionIsRequired => {
                "Delivery.IncidentDescriptionIsRequired"
            }
        }
    }

    /// Every rule violation is a validation failure: retrying cannot help.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// Errors raised while constructing a package.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackageError {
    #[error("The package number is required")]
    NumberIsRequired,

    #[error("The patient ID is required")]
    PatientIdIsRequired,

    #[error("The patient's name is required")]
    PatientNameIsRequired,

    #[error("The patient's phone number is required")]
    PatientPhoneIsRequired,

    #[error("The delivery address is required")]
    DeliveryAddressIsRequired,

    #[error("The delivery latitude must be between -90 and 90 degrees (got {latitude})")]
    InvalidDeliveryLatitude { latitude: f64 },

    #[error("The delivery longitude must be between -180 and 180 degrees (got {longitude})")]
    InvalidDeliveryLongitude { longitude: f64 },

    #[error("The delivery date cannot be in the past (got {date})")]
    InvalidDeliveryDate { date: chrono::NaiveDate },

    #[error("The driver ID is required")]
    DriverIdIsRequired,
}

impl PackageError {
    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            PackageError::NumberIsRequired => "Package.NumberIsRequired",
            PackageError::PatientIdIsRequired => "Package.PatientIdIsRequired",
            PackageError::PatientNameIsRequired => "Package.PatientNameIsRequired",
            PackageError::PatientPhoneIsRequired => "Package.PatientPhoneIsRequired",
            PackageError::DeliveryAddressIsRequired => "Package.DeliveryAddressIsRequired",
            PackageError::InvalidDeliveryLatitude { .. } => "Package.InvalidDeliveryLatitude",
            PackageError::InvalidDeliveryLongitude { .. } => "Package.InvalidDeliveryLongitude",
            PackageError::InvalidDeliveryDate { .. } => "Package.InvalidDeliveryDate",
            PackageError::DriverIdIsRequired => "Package.DriverIdIsRequired",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
