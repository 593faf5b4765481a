use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{DriverId, EventId, PackageId};
use domain::{AggregateRoot, Driver, Package, PackageRecord};

use crate::{OutboxMessage, Result};

/// How a staged package row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert the row unless one with the same id exists.
    InsertIfAbsent,
    /// Insert or replace the row.
    Upsert,
}

/// A package row staged for commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedPackage {
    pub record: PackageRecord,
    pub mode: WriteMode,
}

/// Writes collected for a single atomic commit.
///
/// Staging a package drains its pending events into outbox records, so the
/// state change and every event it produced land in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    packages: Vec<StagedPackage>,
    drivers: Vec<Driver>,
    outbox: Vec<OutboxMessage>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a newly created package.
    pub fn add_package(&mut self, package: &mut Package) -> Result<()> {
        self.stage_package(package, WriteMode::InsertIfAbsent)
    }

    /// Stages the current state of an existing package.
    pub fn save_package(&mut self, package: &mut Package) -> Result<()> {
        self.stage_package(package, WriteMode::Upsert)
    }

    /// Stages a driver insert or update.
    pub fn save_driver(&mut self, driver: &Driver) {
        self.drivers.push(driver.clone());
    }

    fn stage_package(&mut self, package: &mut Package, mode: WriteMode) -> Result<()> {
        let messages = package
            .pending_events()
            .iter()
            .map(OutboxMessage::from_event)
            .collect::<Result<Vec<_>>>()?;

        // Only drain once every event has been mapped.
        package.take_events();
        self.outbox.extend(messages);
        self.packages.push(StagedPackage {
            record: package.to_record(),
            mode,
        });
        Ok(())
    }

    pub fn packages(&self) -> &[StagedPackage] {
        &self.packages
    }

    pub fn drivers(&self) -> &[Driver] {
        &self.drivers
    }

    pub fn outbox_messages(&self) -> &[OutboxMessage] {
        &self.outbox
    }

    /// Returns true if nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.drivers.is_empty() && self.outbox.is_empty()
    }
}

/// Per-driver package count for one delivery date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverDeliveryLoad {
    pub driver_id: DriverId,
    pub packages_count: i64,
}

/// Persistence port for packages and drivers.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Loads a package by id.
    async fn get_package(&self, id: PackageId) -> Result<Option<Package>>;

    /// Loads a driver by id.
    async fn get_driver(&self, id: DriverId) -> Result<Option<Driver>>;

    /// Returns every driver ordered by name.
    async fn list_drivers(&self) -> Result<Vec<Driver>>;

    /// Returns a driver's packages for a date, in route order.
    async fn packages_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Package>>;

    /// Applies every staged write atomically: all succeed or none do.
    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<()>;
}

/// Persistence port used by the outbox relay.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Returns up to `limit` unprocessed messages, oldest first.
    async fn pending_outbox_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>>;

    /// Marks a message as published and clears its error.
    async fn mark_outbox_processed(&self, id: EventId, processed_on: DateTime<Utc>)
    -> Result<()>;

    /// Records the latest publish failure; the message stays pending.
    async fn mark_outbox_failed(&self, id: EventId, error: &str) -> Result<()>;
}

/// Read port for per-date driver workload.
#[async_trait]
pub trait DriverLoadReader: Send + Sync {
    /// Returns package counts for drivers with at least one package on `date`.
    async fn driver_delivery_loads(&self, date: NaiveDate) -> Result<Vec<DriverDeliveryLoad>>;
}

#[async_trait]
impl<T: DeliveryStore + ?Sized> DeliveryStore for std::sync::Arc<T> {
    async fn get_package(&self, id: PackageId) -> Result<Option<Package>> {
        (**self).get_package(id).await
    }

    async fn get_driver(&self, id: DriverId) -> Result<Option<Driver>> {
        (**self).get_driver(id).await
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>> {
        (**self).list_drivers().await
    }

    async fn packages_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Package>> {
        (**self).packages_by_driver_and_date(driver_id, date).await
    }

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<()> {
        (**self).commit(unit_of_work).await
    }
}

#[async_trait]
impl<T: OutboxStore + ?Sized> OutboxStore for std::sync::Arc<T> {
    async fn pending_outbox_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        (**self).pending_outbox_messages(limit).await
    }

    async fn mark_outbox_processed(
        &self,
        id: EventId,
        processed_on: DateTime<Utc>,
    ) -> Result<()> {
        (**self).mark_outbox_processed(id, processed_on).await
    }

    async fn mark_outbox_failed(&self, id: EventId, error: &str) -> Result<()> {
        (**self).mark_outbox_failed(id, error).await
    }
}

#[async_trait]
impl<T: DriverLoadReader + ?Sized> DriverLoadReader for std::sync::Arc<T> {
    async fn driver_delivery_loads(&self, date: NaiveDate) -> Result<Vec<DriverDeliveryLoad>> {
        (**self).driver_delivery_loads(date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PatientId;
    use domain::{DomainEvent, NewPackage};

    fn package() -> Package {
        Package::create(NewPackage {
            id: PackageId::new(),
            number: "PKG-1".to_string(),
            patient_id: PatientId::new(),
            patient_name: "Jane".to_string(),
            patient_phone: "555".to_string(),
            delivery_address: "1 Main St".to_string(),
            delivery_latitude: 0.0,
            delivery_longitude: 0.0,
            delivery_date: Utc::now().date_naive(),
            driver_id: DriverId::new(),
        })
        .unwrap()
    }

    #[test]
    fn test_staging_drains_events_into_outbox() {
        let mut package = package();
        package.set_delivery_order(1).unwrap();
        package.mark_in_transit().unwrap();
        let event_id = package.pending_events()[0].event_id();

        let mut uow = UnitOfWork::new();
        uow.save_package(&mut package).unwrap();

        assert!(!package.has_pending_events());
        assert_eq!(uow.outbox_messages().len(), 1);
        assert_eq!(uow.outbox_messages()[0].id, event_id);
        assert_eq!(uow.packages()[0].mode, WriteMode::Upsert);
        assert_eq!(uow.packages()[0].record, package.to_record());
    }

    #[test]
    fn test_add_package_without_events_stages_row_only() {
        let mut package = package();
        let mut uow = UnitOfWork::new();
        uow.add_package(&mut package).unwrap();

        assert_eq!(uow.packages()[0].mode, WriteMode::InsertIfAbsent);
        assert!(uow.outbox_messages().is_empty());
        assert!(!uow.is_empty());
    }
}
