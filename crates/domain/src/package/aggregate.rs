//! Package aggregate implementation.

use chrono::{DateTime, NaiveDate, Utc};
use common::{DriverId, EventId, PackageId, PatientId};

use crate::aggregate::AggregateRoot;

use super::{
    DeliveryError, DeliveryStatus, DeliveryStatusChanged, IncidentType, PackageError,
    PackageEvent,
};

/// Everything needed to create a package.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPackage {
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

/// Flat persisted form of a package.
///
/// Storage backends read and write this shape; it bypasses validation so
/// rows written earlier always load back even if rules tighten later.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageRecord {
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
    pub delivery_order: i32,
    pub delivery_status: DeliveryStatus,
    pub delivery_evidence: Option<String>,
    pub incident_type: Option<IncidentType>,
    pub incident_description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Package aggregate root.
///
/// Tracks a single medical delivery from route assignment to its final
/// outcome. All mutations go through the transition methods below, which
/// leave the package untouched when they return an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    id: PackageId,
    number: String,
    patient_id: PatientId,
    patient_name: String,
    patient_phone: String,
    delivery_address: String,
    delivery_latitude: f64,
    delivery_longitude: f64,
    delivery_date: NaiveDate,
    driver_id: DriverId,

    /// Position within the driver's route for the day; 0 means unassigned.
    delivery_order: i32,

    delivery_status: DeliveryStatus,
    delivery_evidence: Option<String>,
    incident_type: Option<IncidentType>,
    incident_description: Option<String>,
    updated_at: Option<DateTime<Utc>>,

    /// Events recorded since the last commit.
    pending_events: Vec<PackageEvent>,
}

impl AggregateRoot for Package {
    type Id = PackageId;
    type Event = PackageEvent;

    fn aggregate_type() -> &'static str {
        "Package"
    }

    fn id(&self) -> PackageId {
        self.id
    }

    fn pending_events(&self) -> &[PackageEvent] {
        &self.pending_events
    }

    fn take_events(&mut self) -> Vec<PackageEvent> {
        std::mem::take(&mut self.pending_events)
    }
}

// Construction
impl Package {
    /// Validates the input and creates a pending, unassigned package.
    ///
    /// Dates are compared against today's UTC date. Creation records no
    /// event.
    pub fn create(input: NewPackage) -> Result<Self, PackageError> {
        Self::create_on(input, Utc::now().date_naive())
    }

    fn create_on(input: NewPackage, today: NaiveDate) -> Result<Self, PackageError> {
        if input.number.trim().is_empty() {
            return Err(PackageError::NumberIsRequired);
        }
        if input.patient_id.is_nil() {
            return Err(PackageError::PatientIdIsRequired);
        }
        if input.patient_name.trim().is_empty() {
            return Err(PackageError::PatientNameIsRequired);
        }
        if input.patient_phone.trim().is_empty() {
            return Err(PackageError::PatientPhoneIsRequired);
        }
        if input.delivery_address.trim().is_empty() {
            return Err(PackageError::DeliveryAddressIsRequired);
        }
        if !(-90.0..=90.0).contains(&input.delivery_latitude) {
            return Err(PackageError::InvalidDeliveryLatitude {
                latitude: input.delivery_latitude,
            });
        }
        if !(-180.0..=180.0).contains(&input.delivery_longitude) {
            return Err(PackageError::InvalidDeliveryLongitude {
                longitude: input.delivery_longitude,
            });
        }
        if input.delivery_date < today {
            return Err(PackageError::InvalidDeliveryDate {
                date: input.delivery_date,
            });
        }
        if input.driver_id.is_nil() {
            return Err(PackageError::DriverIdIsRequired);
        }

        Ok(Self {
            id: input.id,
            number: input.number,
            patient_id: input.patient_id,
            patient_name: input.patient_name,
            patient_phone: input.patient_phone,
            delivery_address: input.delivery_address,
            delivery_latitude: input.delivery_latitude,
            delivery_longitude: input.delivery_longitude,
            delivery_date: input.delivery_date,
            driver_id: input.driver_id,
            delivery_order: 0,
            delivery_status: DeliveryStatus::Pending,
            delivery_evidence: None,
            incident_type: None,
            incident_description: None,
            updated_at: None,
            pending_events: Vec::new(),
        })
    }

    /// Rehydrates a package from storage.
    pub fn from_record(record: PackageRecord) -> Self {
        Self {
            id: record.id,
            number: record.number,
            patient_id: record.patient_id,
            patient_name: record.patient_name,
            patient_phone: record.patient_phone,
            delivery_address: record.delivery_address,
            delivery_latitude: record.delivery_latitude,
            delivery_longitude: record.delivery_longitude,
            delivery_date: record.delivery_date,
            driver_id: record.driver_id,
            delivery_order: record.delivery_order,
            delivery_status: record.delivery_status,
            delivery_evidence: record.delivery_evidence,
            incident_type: record.incident_type,
            incident_description: record.incident_description,
            updated_at: record.updated_at,
            pending_events: Vec::new(),
        }
    }

    /// Returns the persisted form of the current state.
    pub fn to_record(&self) -> PackageRecord {
        PackageRecord {
            id: self.id,
            number: self.number.clone(),
            patient_id: self.patient_id,
            patient_name: self.patient_name.clone(),
            patient_phone: self.patient_phone.clone(),
            delivery_address: self.delivery_address.clone(),
            delivery_latitude: self.delivery_latitude,
            delivery_longitude: self.delivery_longitude,
            delivery_date: self.delivery_date,
            driver_id: self.driver_id,
            delivery_order: self.delivery_order,
            delivery_status: self.delivery_status,
            delivery_evidence: self.delivery_evidence.clone(),
            incident_type: self.incident_type,
            incident_description: self.incident_description.clone(),
            updated_at: self.updated_at,
        }
    }
}

// Query methods
impl Package {
    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn patient_id(&self) -> PatientId {
        self.patient_id
    }

    pub fn patient_name(&self) -> &str {
        &self.patient_name
    }

    pub fn patient_phone(&self) -> &str {
        &self.patient_phone
    }

    pub fn delivery_address(&self) -> &str {
        &self.delivery_address
    }

    /// Returns the delivery coordinates as `(latitude, longitude)`.
    pub fn delivery_position(&self) -> (f64, f64) {
        (self.delivery_latitude, self.delivery_longitude)
    }

    pub fn delivery_date(&self) -> NaiveDate {
        self.delivery_date
    }

    pub fn driver_id(&self) -> DriverId {
        self.driver_id
    }

    /// Returns the route position, 0 when unassigned.
    pub fn delivery_order(&self) -> i32 {
        self.delivery_order
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery_status
    }

    pub fn delivery_evidence(&self) -> Option<&str> {
        self.delivery_evidence.as_deref()
    }

    pub fn incident_type(&self) -> Option<IncidentType> {
        self.incident_type
    }

    pub fn incident_description(&self) -> Option<&str> {
        self.incident_description.as_deref()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

// Transition methods
impl Package {
    /// Places the package at position `order` in the driver's route.
    ///
    /// Not externally observable: no event is recorded.
    pub fn set_delivery_order(&mut self, order: i32) -> Result<(), DeliveryError> {
        if order <= 0 {
            return Err(DeliveryError::InvalidOrderValue { order });
        }
        self.ensure(self.delivery_status.can_set_order(), "set delivery order")?;

        self.delivery_order = order;
        self.updated_at = Some(Utc::now());
        Ok(())
    }

    /// Sends the package out for delivery.
    pub fn mark_in_transit(&mut self) -> Result<(), DeliveryError> {
        if self.delivery_order <= 0 {
            return Err(DeliveryError::InvalidOrderValue {
                order: self.delivery_order,
            });
        }
        self.ensure(self.delivery_status.can_start_transit(), "mark in transit")?;

        self.delivery_status = DeliveryStatus::InTransit;
        self.record_status_change();
        Ok(())
    }

    /// Completes the delivery with proof of receipt.
    ///
    /// Blank evidence is rejected before the status is looked at.
    pub fn mark_completed(&mut self, evidence: &str) -> Result<(), DeliveryError> {
        if evidence.trim().is_empty() {
            return Err(DeliveryError::DeliveryEvidenceIsRequired);
        }
        self.ensure(self.delivery_status.can_complete(), "complete")?;

        self.delivery_evidence = Some(evidence.to_string());
        self.delivery_status = DeliveryStatus::Completed;
        self.record_status_change();
        Ok(())
    }

    /// Records a failed delivery attempt.
    pub fn mark_failed(&mut self) -> Result<(), DeliveryError> {
        self.ensure(self.delivery_status.can_fail(), "mark failed")?;

        self.delivery_status = DeliveryStatus::Failed;
        self.record_status_change();
        Ok(())
    }

    /// Calls off the delivery. Completed deliveries cannot be cancelled.
    pub fn cancel(&mut self) -> Result<(), DeliveryError> {
        if !self.delivery_status.can_cancel() {
            return Err(DeliveryError::CannotCancelCompletedDelivery);
        }

        self.delivery_status = DeliveryStatus::Cancelled;
        self.record_status_change();
        Ok(())
    }

    /// Explains why a failed delivery failed. The status stays Failed.
    pub fn register_incident(
        &mut self,
        incident_type: IncidentType,
        description: &str,
    ) -> Result<(), DeliveryError> {
        if description.trim().is_empty() {
            return Err(DeliveryError::IncidentDescriptionIsRequired);
        }
        if !self.delivery_status.can_register_incident() {
            return Err(DeliveryError::CannotRegisterIncidentInCurrentStatus {
                current: self.delivery_status,
            });
        }

        self.incident_type = Some(incident_type);
        self.incident_description = Some(description.to_string());
        self.record_status_change();
        Ok(())
    }

    fn ensure(&self, allowed: bool, action: &'static str) -> Result<(), DeliveryError> {
        if allowed {
            Ok(())
        } else {
            Err(DeliveryError::InvalidStatusTransition {
                current: self.delivery_status,
                action,
            })
        }
    }

    fn record_status_change(&mut self) {
        let now = Utc::now();
        self.updated_at = Some(now);
        self.pending_events
            .push(PackageEvent::DeliveryStatusChanged(DeliveryStatusChanged {
                event_id: EventId::new(),
                occurred_on: now,
                package_id: self.id,
                driver_id: self.driver_id,
                number: self.number.clone(),
                delivery_status: self.delivery_status,
                incident_type: self.incident_type,
                incident_description: self.incident_description.clone(),
                delivery_evidence: self.delivery_evidence.clone(),
                updated_at: self.updated_at,
            }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Days;

    fn new_package() -> NewPackage {
        NewPackage {
            id: PackageId::new(),
            number: "PKG-001".to_string(),
            patient_id: PatientId::new(),
            patient_name: "Jane Roe".to_string(),
            patient_phone: "+1 555 0100".to_string(),
            delivery_address: "12 Main St".to_string(),
            delivery_latitude: -12.05,
            delivery_longitude: -77.04,
            delivery_date: Utc::now().date_naive(),
            driver_id: DriverId::new(),
        }
    }

    fn routed_package() -> Package {
        let mut package = Package::create(new_package()).unwrap();
        package.set_delivery_order(1).unwrap();
        package
    }

    fn in_transit_package() -> Package {
        let mut package = routed_package();
        package.mark_in_transit().unwrap();
        package.take_events();
        package
    }

    fn failed_package() -> Package {
        let mut package = in_transit_package();
        package.mark_failed().unwrap();
        package.take_events();
        package
    }

    fn only_event(package: &mut Package) -> DeliveryStatusChanged {
        let mut events = package.take_events();
        assert_eq!(events.len(), 1);
        match events.remove(0) {
            PackageEvent::DeliveryStatusChanged(data) => data,
        }
    }

    #[test]
    fn test_create_package() {
        let input = new_package();
        let package = Package::create(input.clone()).unwrap();

        assert_eq!(package.id(), input.id);
        assert_eq!(package.delivery_status(), DeliveryStatus::Pending);
        assert_eq!(package.delivery_order(), 0);
        assert!(package.updated_at().is_none());
        assert!(!package.has_pending_events());
    }

    #[test]
    fn test_create_rejects_blank_fields_in_order() {
        let mut input = new_package();
        input.number = "  ".to_string();
        input.patient_name = String::new();
        assert_eq!(
            Package::create(input.clone()).unwrap_err(),
            PackageError::NumberIsRequired
        );

        input.number = "PKG-002".to_string();
        assert_eq!(
            Package::create(input).unwrap_err(),
            PackageError::PatientNameIsRequired
        );

        let mut input = new_package();
        input.patient_id = PatientId::from_uuid(uuid::Uuid::nil());
        assert_eq!(
            Package::create(input).unwrap_err(),
            PackageError::PatientIdIsRequired
        );

        let mut input = new_package();
        input.delivery_address = "\t".to_string();
        assert_eq!(
            Package::create(input).unwrap_err().code(),
            "Package.DeliveryAddressIsRequired"
        );
    }

    #[test]
    fn test_create_rejects_out_of_range_coordinates() {
        let mut input = new_package();
        input.delivery_latitude = 90.5;
        assert!(matches!(
            Package::create(input).unwrap_err(),
            PackageError::InvalidDeliveryLatitude { .. }
        ));

        let mut input = new_package();
        input.delivery_longitude = f64::NAN;
        assert!(matches!(
            Package::create(input).unwrap_err(),
            PackageError::InvalidDeliveryLongitude { .. }
        ));

        let mut input = new_package();
        input.delivery_latitude = -90.0;
        input.delivery_longitude = 180.0;
        assert!(Package::create(input).is_ok());
    }

    #[test]
    fn test_create_rejects_past_date() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let mut input = new_package();
        input.delivery_date = today.checked_sub_days(Days::new(1)).unwrap();

        let err = Package::create_on(input.clone(), today).unwrap_err();
        assert_eq!(err.code(), "Package.InvalidDeliveryDate");

        input.delivery_date = today;
        assert!(Package::create_on(input, today).is_ok());
    }

    #[test]
    fn test_create_requires_driver() {
        let mut input = new_package();
        input.driver_id = DriverId::from_uuid(uuid::Uuid::nil());
        assert_eq!(
            Package::create(input).unwrap_err(),
            PackageError::DriverIdIsRequired
        );
    }

    #[test]
    fn test_set_delivery_order() {
        let mut package = Package::create(new_package()).unwrap();
        package.set_delivery_order(3).unwrap();

        assert_eq!(package.delivery_order(), 3);
        assert!(package.updated_at().is_some());
        assert!(!package.has_pending_events());
    }

    #[test]
    fn test_set_delivery_order_rejects_non_positive() {
        let mut package = Package::create(new_package()).unwrap();
        assert_eq!(
            package.set_delivery_order(0),
            Err(DeliveryError::InvalidOrderValue { order: 0 })
        );
        assert_eq!(
            package.set_delivery_order(-4),
            Err(DeliveryError::InvalidOrderValue { order: -4 })
        );
        assert_eq!(package.delivery_order(), 0);
    }

    #[test]
    fn test_set_delivery_order_after_transit_fails() {
        let mut package = in_transit_package();
        let err = package.set_delivery_order(2).unwrap_err();
        assert_eq!(
            err,
            DeliveryError::InvalidStatusTransition {
                current: DeliveryStatus::InTransit,
                action: "set delivery order",
            }
        );
        assert_eq!(package.delivery_order(), 1);
    }

    #[test]
    fn test_mark_in_transit_requires_order() {
        let mut package = Package::create(new_package()).unwrap();
        assert_eq!(
            package.mark_in_transit(),
            Err(DeliveryError::InvalidOrderValue { order: 0 })
        );
        assert_eq!(package.delivery_status(), DeliveryStatus::Pending);
        assert!(!package.has_pending_events());
    }

    #[test]
    fn test_mark_in_transit_records_event() {
        let mut package = routed_package();
        package.mark_in_transit().unwrap();

        assert_eq!(package.delivery_status(), DeliveryStatus::InTransit);
        let event = only_event(&mut package);
        assert_eq!(event.package_id, package.id());
        assert_eq!(event.driver_id, package.driver_id());
        assert_eq!(event.number, "PKG-001");
        assert_eq!(event.delivery_status, DeliveryStatus::InTransit);
        assert_eq!(event.updated_at, package.updated_at());
        assert!(event.delivery_evidence.is_none());
    }

    #[test]
    fn test_mark_in_transit_twice_fails() {
        let mut package = in_transit_package();
        assert!(matches!(
            package.mark_in_transit(),
            Err(DeliveryError::InvalidStatusTransition { .. })
        ));
        assert!(!package.has_pending_events());
    }

    #[test]
    fn test_mark_completed() {
        let mut package = in_transit_package();
        package.mark_completed("signed-by-jane.png").unwrap();

        assert_eq!(package.delivery_status(), DeliveryStatus::Completed);
        assert_eq!(package.delivery_evidence(), Some("signed-by-jane.png"));
        let event = only_event(&mut package);
        assert_eq!(event.delivery_evidence.as_deref(), Some("signed-by-jane.png"));
    }

    #[test]
    fn test_blank_evidence_fails_in_any_status() {
        let mut pending = Package::create(new_package()).unwrap();
        assert_eq!(
            pending.mark_completed("   "),
            Err(DeliveryError::DeliveryEvidenceIsRequired)
        );

        let mut in_transit = in_transit_package();
        assert_eq!(
            in_transit.mark_completed(""),
            Err(DeliveryError::DeliveryEvidenceIsRequired)
        );
        assert_eq!(in_transit.delivery_status(), DeliveryStatus::InTransit);
    }

    #[test]
    fn test_mark_completed_from_pending_fails() {
        let mut package = routed_package();
        assert!(matches!(
            package.mark_completed("photo"),
            Err(DeliveryError::InvalidStatusTransition {
                current: DeliveryStatus::Pending,
                ..
            })
        ));
        assert!(package.delivery_evidence().is_none());
    }

    #[test]
    fn test_mark_failed() {
        let mut package = in_transit_package();
        package.mark_failed().unwrap();

        assert_eq!(package.delivery_status(), DeliveryStatus::Failed);
        assert_eq!(only_event(&mut package).delivery_status, DeliveryStatus::Failed);
    }

    #[test]
    fn test_mark_failed_from_pending_fails() {
        let mut package = routed_package();
        assert!(package.mark_failed().is_err());
        assert_eq!(package.delivery_status(), DeliveryStatus::Pending);
    }

    #[test]
    fn test_cancel_from_any_non_terminal_status() {
        let mut pending = routed_package();
        pending.cancel().unwrap();
        assert_eq!(pending.delivery_status(), DeliveryStatus::Cancelled);
        assert_eq!(
            only_event(&mut pending).delivery_status,
            DeliveryStatus::Cancelled
        );

        let mut in_transit = in_transit_package();
        in_transit.cancel().unwrap();
        assert_eq!(in_transit.delivery_status(), DeliveryStatus::Cancelled);

        let mut failed = failed_package();
        failed.cancel().unwrap();
        assert_eq!(failed.delivery_status(), DeliveryStatus::Cancelled);
    }

    #[test]
    fn test_cancel_completed_fails() {
        let mut package = in_transit_package();
        package.mark_completed("photo").unwrap();
        package.take_events();

        let err = package.cancel().unwrap_err();
        assert_eq!(err, DeliveryError::CannotCancelCompletedDelivery);
        assert_eq!(err.code(), "Delivery.CannotCancelDelivered");
        assert_eq!(package.delivery_status(), DeliveryStatus::Completed);
        assert!(!package.has_pending_events());
    }

    #[test]
    fn test_register_incident() {
        let mut package = failed_package();
        package
            .register_incident(IncidentType::PatientAbsent, "nobody answered the door")
            .unwrap();

        assert_eq!(package.delivery_status(), DeliveryStatus::Failed);
        assert_eq!(package.incident_type(), Some(IncidentType::PatientAbsent));
        let event = only_event(&mut package);
        assert_eq!(event.delivery_status, DeliveryStatus::Failed);
        assert_eq!(event.incident_type, Some(IncidentType::PatientAbsent));
        assert_eq!(
            event.incident_description.as_deref(),
            Some("nobody answered the door")
        );
    }

    #[test]
    fn test_register_incident_requires_description() {
        let mut package = failed_package();
        assert_eq!(
            package.register_incident(IncidentType::Other, " "),
            Err(DeliveryError::IncidentDescriptionIsRequired)
        );
        assert!(package.incident_type().is_none());
    }

    #[test]
    fn test_register_incident_outside_failed_fails() {
        let mut package = in_transit_package();
        let err = package
            .register_incident(IncidentType::WeatherIssue, "storm")
            .unwrap_err();
        assert_eq!(
            err,
            DeliveryError::CannotRegisterIncidentInCurrentStatus {
                current: DeliveryStatus::InTransit
            }
        );
        assert_eq!(err.code(), "Delivery.CannotRegisterIncident");
    }

    #[test]
    fn test_record_roundtrip_preserves_state() {
        let mut package = failed_package();
        package
            .register_incident(IncidentType::IncorrectAddress, "wrong street")
            .unwrap();

        let restored = Package::from_record(package.to_record());
        assert_eq!(restored.to_record(), package.to_record());
        assert!(!restored.has_pending_events());
    }

    #[test]
    fn test_errors_are_validation_kind() {
        assert_eq!(
            DeliveryError::DeliveryEvidenceIsRequired.kind(),
            crate::ErrorKind::Validation
        );
        assert!(!PackageError::NumberIsRequired.kind().is_retryable());
    }
}
