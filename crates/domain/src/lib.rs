//! Domain layer for package delivery tracking.
//!
//! This crate holds the pure, I/O-free core:
//! - [`Package`] aggregate enforcing the delivery status state machine
//! - [`Driver`] identity with an optional last-known position
//! - [`PackageEvent`] domain events drained from aggregates at commit time
//! - Typed errors carrying stable codes and an [`ErrorKind`] classification

pub mod aggregate;
pub mod driver;
pub mod error;
pub mod package;

pub use aggregate::{AggregateRoot, DomainEvent};
pub use driver::{Driver, DriverError};
pub use error::{ErrorKind, UnknownVariant};
pub use package::{
    DeliveryError, DeliveryStatus, DeliveryStatusChanged, IncidentType, NewPackage, Package,
    PackageError, PackageEvent, PackageRecord, StatusChangedPayload,
};
