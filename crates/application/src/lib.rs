//! Application layer for package delivery tracking.
//!
//! This crate provides:
//! - [`PackageService`] and [`DriverService`] executing commands as units of work
//! - [`CommandHandler`] loading, mutating and committing a package
//! - [`DriverSelectionEngine`] picking a driver for a new delivery

pub mod command;
pub mod commands;
pub mod error;
pub mod selection;
pub mod services;

pub use command::{CommandHandler, CommandResult};
pub use commands::{CreatePackage, RegisterIncident};
pub use error::{ApplicationError, Result};
pub use selection::{
    DriverSelectionEngine, EARTH_RADIUS_KM, SelectionCriteria, SelectionStrategy, UnknownStrategy,
    haversine_km,
};
pub use services::{DriverService, PackageService};
