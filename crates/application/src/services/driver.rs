//! Driver directory service.

use common::DriverId;
use domain::Driver;
use store::{DeliveryStore, UnitOfWork};

use crate::error::{ApplicationError, Result};

/// Registers drivers and tracks their last known position.
pub struct DriverService<S>
where
    S: DeliveryStore,
{
    store: S,
}

impl<S> DriverService<S>
where
    S: DeliveryStore,
{
    /// Creates a new driver service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a driver under a fresh id.
    #[tracing::instrument(skip(self))]
    pub async fn create_driver(&self, name: &str) -> Result<DriverId> {
        let driver = Driver::new(DriverId::new(), name.trim())?;

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.save_driver(&driver);
        self.store.commit(unit_of_work).await?;

        tracing::info!(driver_id = %driver.id(), "driver registered");
        Ok(driver.id())
    }

    /// Replaces the driver's current position.
    #[tracing::instrument(skip(self))]
    pub async fn update_location(
        &self,
        driver_id: DriverId,
        latitude: f64,
        longitude: f64,
    ) -> Result<Driver> {
        let mut driver = self.get_driver(driver_id).await?;
        driver.update_location(latitude, longitude)?;

        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.save_driver(&driver);
        self.store.commit(unit_of_work).await?;
        Ok(driver)
    }

    /// Loads a driver, failing with `Driver.NotFound` if it doesn't exist.
    pub async fn get_driver(&self, driver_id: DriverId) -> Result<Driver> {
        self.store
            .get_driver(driver_id)
            .await?
            .ok_or(ApplicationError::DriverNotFound(driver_id))
    }

    /// Returns every driver ordered by name.
    pub async fn list_drivers(&self) -> Result<Vec<Driver>> {
        Ok(self.store.list_drivers().await?)
    }
}
