//! Package command and query service.

use chrono::NaiveDate;
use common::{DriverId, PackageId};
use domain::{AggregateRoot, Package};
use store::{DeliveryStore, UnitOfWork};

use crate::command::{CommandHandler, CommandResult};
use crate::commands::{CreatePackage, RegisterIncident};
use crate::error::Result;

/// Creates packages and drives them through the delivery state machine.
pub struct PackageService<S>
where
    S: DeliveryStore,
{
    handler: CommandHandler<S>,
}

impl<S> PackageService<S>
where
    S: DeliveryStore,
{
    /// Creates a new package service.
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        self.handler.store()
    }

    /// Creates a package.
    ///
    /// Idempotent on id: if the package already exists its id is returned
    /// and nothing is written.
    #[tracing::instrument(skip(self, cmd), fields(package_id = %cmd.id, driver_id = %cmd.driver_id))]
    pub async fn create_package(&self, cmd: CreatePackage) -> Result<PackageId> {
        if let Some(existing) = self.store().get_package(cmd.id).await? {
            tracing::debug!("package already exists, skipping creation");
            return Ok(existing.id());
        }

        let mut package = Package::create(cmd.into())?;
        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.add_package(&mut package)?;
        self.store().commit(unit_of_work).await?;

        metrics::counter!("packages_created_total").increment(1);
        tracing::info!(number = package.number(), "package created");
        Ok(package.id())
    }

    /// Sets the package's position in its driver's route.
    #[tracing::instrument(skip(self))]
    pub async fn set_delivery_order(
        &self,
        package_id: PackageId,
        order: i32,
    ) -> Result<CommandResult> {
        self.handler
            .execute(package_id, |p| p.set_delivery_order(order))
            .await
    }

    /// Sends the package out for delivery.
    #[tracing::instrument(skip(self))]
    pub async fn mark_in_transit(&self, package_id: PackageId) -> Result<CommandResult> {
        self.handler
            .execute(package_id, |p| p.mark_in_transit())
            .await
    }

    /// Completes the delivery with proof of receipt.
    #[tracing::instrument(skip(self, evidence))]
    pub async fn mark_completed(
        &self,
        package_id: PackageId,
        evidence: &str,
    ) -> Result<CommandResult> {
        self.handler
            .execute(package_id, |p| p.mark_completed(evidence))
            .await
    }

    /// Records a failed delivery attempt.
    #[tracing::instrument(skip(self))]
    pub async fn mark_failed(&self, package_id: PackageId) -> Result<CommandResult> {
        self.handler.execute(package_id, |p| p.mark_failed()).await
    }

    /// Calls off the delivery.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, package_id: PackageId) -> Result<CommandResult> {
        self.handler.execute(package_id, |p| p.cancel()).await
    }

    /// Records an incident against a failed delivery.
    #[tracing::instrument(skip(self, cmd), fields(package_id = %cmd.package_id, incident_type = %cmd.incident_type))]
    pub async fn register_incident(&self, cmd: RegisterIncident) -> Result<CommandResult> {
        self.handler
            .execute(cmd.package_id, |p| {
                p.register_incident(cmd.incident_type, &cmd.description)
            })
            .await
    }

    /// Loads a package, failing with `Package.NotFound` if it doesn't exist.
    pub async fn get_package(&self, package_id: PackageId) -> Result<Package> {
        self.handler.load(package_id).await
    }

    /// Returns a driver's route for a date, ordered by delivery order.
    pub async fn packages_for_driver_on(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Package>> {
        Ok(self
            .store()
            .packages_by_driver_and_date(driver_id, date)
            .await?)
    }
}
