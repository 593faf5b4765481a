//! Command handling infrastructure.

use common::PackageId;
use domain::{AggregateRoot, DeliveryError, Package, PackageEvent};
use store::{DeliveryStore, UnitOfWork};

use crate::error::{ApplicationError, Result};

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// The package after the command was applied.
    pub package: Package,

    /// The events that were generated and persisted.
    pub events: Vec<PackageEvent>,
}

/// Handler for executing commands against existing packages.
///
/// The handler is responsible for:
/// 1. Loading the package from the store
/// 2. Running the transition against it
/// 3. Committing the new state and its outbox records as one unit of work
pub struct CommandHandler<S>
where
    S: DeliveryStore,
{
    store: S,
}

impl<S> CommandHandler<S>
where
    S: DeliveryStore,
{
    /// Creates a new command handler with the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads a package, failing with `PackageNotFound` if it doesn't exist.
    pub async fn load(&self, package_id: PackageId) -> Result<Package> {
        self.store
            .get_package(package_id)
            .await?
            .ok_or(ApplicationError::PackageNotFound(package_id))
    }

    /// Executes a transition and persists the result.
    ///
    /// Nothing is written when the transition is rejected.
    pub async fn execute<F>(&self, package_id: PackageId, command_fn: F) -> Result<CommandResult>
    where
        F: FnOnce(&mut Package) -> std::result::Result<(), DeliveryError>,
    {
        let mut package = self.load(package_id).await?;

        command_fn(&mut package)?;

        let events = package.pending_events().to_vec();
        let mut unit_of_work = UnitOfWork::new();
        unit_of_work.save_package(&mut package)?;
        self.store.commit(unit_of_work).await?;

        Ok(CommandResult { package, events })
    }
}
