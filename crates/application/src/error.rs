//! Application error types.

use common::{DriverId, PackageId};
use domain::{DeliveryError, DriverError, ErrorKind, PackageError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while handling commands and queries.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// A delivery status rule was violated.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Package input failed validation.
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// Driver input failed validation.
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// The package does not exist.
    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    /// The driver does not exist.
    #[error("Driver not found: {0}")]
    DriverNotFound(DriverId),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl ApplicationError {
    /// Classifies the failure for retry decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApplicationError::Delivery(e) => e.kind(),
            ApplicationError::Package(e) => e.kind(),
            ApplicationError::Driver(e) => e.kind(),
            ApplicationError::PackageNotFound(_) | ApplicationError::DriverNotFound(_) => {
                ErrorKind::NotFound
            }
            ApplicationError::Store(e) => e.kind(),
        }
    }

    /// Returns the stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ApplicationError::Delivery(e) => e.code(),
            ApplicationError::Package(e) => e.code(),
            ApplicationError::Driver(e) => e.code(),
            ApplicationError::PackageNotFound(_) => "Package.NotFound",
            ApplicationError::DriverNotFound(_) => "Driver.NotFound",
            ApplicationError::Store(_) => "Store.Unavailable",
        }
    }

    /// Returns true if retrying the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, ApplicationError>;
