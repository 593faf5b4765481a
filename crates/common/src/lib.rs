//! Strongly typed identifiers shared by every crate in the workspace.

pub mod types;

pub use types::{DriverId, EventId, PackageId, PatientId};
