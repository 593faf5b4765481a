//! Command payloads accepted by the application services.

use chrono::NaiveDate;
use common::{DriverId, PackageId, PatientId};
use domain::{IncidentType, NewPackage};

/// Registers a package for delivery by an already selected driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePackage {
    pub id: PackageId,
    pub number: String,
    pub patient_id: PatientId,
    pub patient_name: String,
    pub patient_phone: String,
    pub delivery_address: String,
    pub delivery_latitude: f64,
    pub delivery_longitude: f64,
    pub delivery_date: NaiveDate,
    pub driver_id: DriverId,
}

impl From<CreatePackage> for NewPackage {
    fn from(cmd: CreatePackage) -> Self {
        NewPackage {
            id: cmd.id,
            number: cmd.number,
            patient_id: cmd.patient_id,
            patient_name: cmd.patient_name,
            patient_phone: cmd.patient_phone,
            delivery_address: cmd.delivery_address,
            delivery_latitude: cmd.delivery_latitude,
            delivery_longitude: cmd.delivery_longitude,
            delivery_date: cmd.delivery_date,
            driver_id: cmd.driver_id,
        }
    }
}

/// Records why a failed delivery failed.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterIncident {
    pub package_id: PackageId,
    pub incident_type: IncidentType,
    pub description: String,
}
