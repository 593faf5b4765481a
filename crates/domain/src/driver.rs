//! Driver identity and last-known position.

use chrono::{DateTime, Utc};
use common::DriverId;
use thiserror::Error;

use crate::ErrorKind;

/// Errors raised by driver operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("The driver's name is required")]
    NameIsRequired,

    #[error("The latitude must be between -90 and 90 degrees (got {latitude})")]
    InvalidLatitude { latitude: f64 },

    #[error("The longitude must be between -180 and 180 degrees (got {longitude})")]
    InvalidLongitude { longitude: f64 },
}

impl DriverError {
    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::NameIsRequired => "Driver.NameIsRequired",
            DriverError::InvalidLatitude { .. } => "Driver.InvalidLatitude",
            DriverError::InvalidLongitude { .. } => "Driver.InvalidLongitude",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// A delivery driver.
///
/// The position is optional: a driver who never reported one is still
/// selectable, but never wins on distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    id: DriverId,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    last_location_update: Option<DateTime<Utc>>,
}

impl Driver {
    /// Creates a driver with no known position.
    pub fn new(id: DriverId, name: impl Into<String>) -> Result<Self, DriverError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DriverError::NameIsRequired);
        }

        Ok(Self {
            id,
            name,
            latitude: None,
            longitude: None,
            last_location_update: None,
        })
    }

    /// Rehydrates a driver from storage without validation.
    pub fn restore(
        id: DriverId,
        name: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
        last_location_update: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            name,
            latitude,
            longitude,
            last_location_update,
        }
    }

    pub fn id(&self) -> DriverId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn latitude(&self) -> Option<f64> {
        self.latitude
    }

    pub fn longitude(&self) -> Option<f64> {
        self.longitude
    }

    pub fn last_location_update(&self) -> Option<DateTime<Utc>> {
        self.last_location_update
    }

    /// Returns `(latitude, longitude)` when both are known.
    pub fn position(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// Replaces the current position and stamps the update time.
    pub fn update_location(&mut self, latitude: f64, longitude: f64) -> Result<(), DriverError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(DriverError::InvalidLatitude { latitude });
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(DriverError::InvalidLongitude { longitude });
        }

        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self.last_location_update = Some(Utc::now());
        Ok(())
    }
}
