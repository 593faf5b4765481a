use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{DriverId, EventId, PackageId};
use domain::{Driver, Package, PackageRecord};
use tokio::sync::RwLock;

use crate::{
    OutboxMessage, Result, StoreError,
    store::{
        DeliveryStore, DriverDeliveryLoad, DriverLoadReader, OutboxStore, UnitOfWork, WriteMode,
    },
};

#[derive(Default)]
struct State {
    packages: HashMap<PackageId, PackageRecord>,
    drivers: HashMap<DriverId, Driver>,
    /// Insertion order doubles as a tiebreaker for equal timestamps.
    outbox: Vec<OutboxMessage>,
    commits: usize,
    fail_next_commit: bool,
    fail_loads: bool,
}

/// In-memory store implementation for testing and local runs.
///
/// Provides the same interface and atomicity as the PostgreSQL
/// implementation: a commit either applies every staged write or none.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commit fail without applying anything.
    pub async fn fail_next_commit(&self) {
        self.state.write().await.fail_next_commit = true;
    }

    /// Makes driver load queries fail until reset.
    pub async fn set_fail_loads(&self, fail: bool) {
        self.state.write().await.fail_loads = fail;
    }

    /// Returns the number of successful commits.
    pub async fn commit_count(&self) -> usize {
        self.state.read().await.commits
    }

    /// Returns every outbox message in insertion order.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }

    /// Returns the total number of packages stored.
    pub async fn package_count(&self) -> usize {
        self.state.read().await.packages.len()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn get_package(&self, id: PackageId) -> Result<Option<Package>> {
        let state = self.state.read().await;
        Ok(state.packages.get(&id).cloned().map(Package::from_record))
    }

    async fn get_driver(&self, id: DriverId) -> Result<Option<Driver>> {
        Ok(self.state.read().await.drivers.get(&id).cloned())
    }

    async fn list_drivers(&self) -> Result<Vec<Driver>> {
        let state = self.state.read().await;
        let mut drivers: Vec<_> = state.drivers.values().cloned().collect();
        drivers.sort_by(|a, b| a.name().cmp(b.name()).then(a.id().cmp(&b.id())));
        Ok(drivers)
    }

    async fn packages_by_driver_and_date(
        &self,
        driver_id: DriverId,
        date: NaiveDate,
    ) -> Result<Vec<Package>> {
        let state = self.state.read().await;
        let mut records: Vec<_> = state
            .packages
            .values()
            .filter(|p| p.driver_id == driver_id && p.delivery_date == date)
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            a.delivery_order
                .cmp(&b.delivery_order)
                .then_with(|| a.number.cmp(&b.number))
        });
        Ok(records.into_iter().map(Package::from_record).collect())
    }

    async fn commit(&self, unit_of_work: UnitOfWork) -> Result<()> {
        let mut state = self.state.write().await;

        if std::mem::take(&mut state.fail_next_commit) {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        for staged in unit_of_work.packages() {
            let id = staged.record.id;
            match staged.mode {
                WriteMode::InsertIfAbsent => {
                    state
                        .packages
                        .entry(id)
                        .or_insert_with(|| staged.record.clone());
                }
                WriteMode::Upsert => {
                    state.packages.insert(id, staged.record.clone());
                }
            }
        }

        for driver in unit_of_work.drivers() {
            state.drivers.insert(driver.id(), driver.clone());
        }

        for message in unit_of_work.outbox_messages() {
            if !state.outbox.iter().any(|m| m.id == message.id) {
                state.outbox.push(message.clone());
            }
        }

        state.commits += 1;
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryStore {
    async fn pending_outbox_messages(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state
            .outbox
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        // Stable sort keeps insertion order among equal timestamps.
        pending.sort_by_key(|m| m.occurred_on_utc);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_outbox_processed(
        &self,
        id: EventId,
        processed_on: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id && m.is_pending())
        {
            message.processed_on_utc = Some(processed_on);
            message.error = None;
        }
        Ok(())
    }

    async fn mark_outbox_failed(&self, id: EventId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(message) = state
            .outbox
            .iter_mut()
            .find(|m| m.id == id && m.is_pending())
        {
            message.error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl DriverLoadReader for InMemoryStore {
    async fn driver_delivery_loads(&self, date: NaiveDate) -> Result<Vec<DriverDeliveryLoad>> {
        let state = self.state.read().await;
        if state.fail_loads {
            return Err(StoreError::Unavailable("injected load failure".to_string()));
        }

        let mut counts: HashMap<DriverId, i64> = HashMap::new();
        for record in state.packages.values().filter(|p| p.delivery_date == date) {
            *counts.entry(record.driver_id).or_default() += 1;
        }

        let mut loads: Vec<_> = counts
            .into_iter()
            .map(|(driver_id, packages_count)| DriverDeliveryLoad {
                driver_id,
                packages_count,
            })
            .collect();
        loads.sort_by_key(|l| l.driver_id);
        Ok(loads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::PatientId;
    use domain::{AggregateRoot, DeliveryStatus, NewPackage};

    fn new_package(driver_id: DriverId, number: &str) -> Package {
        Package::create(NewPackage {
            id: PackageId::new(),
            number: number.to_string(),
            patient_id: PatientId::new(),
            patient_name: "Jane".to_string(),
            patient_phone: "555".to_string(),
            delivery_address: "1 Main St".to_string(),
            delivery_latitude: 1.0,
            delivery_longitude: 1.0,
            delivery_date: Utc::now().date_naive(),
            driver_id,
        })
        .unwrap()
    }

    async fn commit_new(store: &InMemoryStore, package: &mut Package) {
        let mut uow = UnitOfWork::new();
        uow.add_package(package).unwrap();
        store.commit(uow).await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_and_load_package() {
        let store = InMemoryStore::new();
        let mut package = new_package(DriverId::new(), "PKG-1");
        commit_new(&store, &mut package).await;

        let loaded = store.get_package(package.id()).await.unwrap().unwrap();
        assert_eq!(loaded.to_record(), package.to_record());
        assert_eq!(store.commit_count().await, 1);
    }

    #[tokio::test]
    async fn test_add_package_does_not_overwrite() {
        let store = InMemoryStore::new();
        let mut package = new_package(DriverId::new(), "PKG-1");
        commit_new(&store, &mut package).await;

        let mut duplicate = Package::from_record(PackageRecord {
            number: "OTHER".to_string(),
            ..package.to_record()
        });
        commit_new(&store, &mut duplicate).await;

        let loaded = store.get_package(package.id()).await.unwrap().unwrap();
        assert_eq!(loaded.number(), "PKG-1");
        assert_eq!(store.package_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let store = InMemoryStore::new();
        let mut package = new_package(DriverId::new(), "PKG-1");
        commit_new(&store, &mut package).await;

        package.set_delivery_order(1).unwrap();
        package.mark_in_transit().unwrap();
        let mut uow = UnitOfWork::new();
        uow.save_package(&mut package).unwrap();

        store.fail_next_commit().await;
        assert!(store.commit(uow).await.is_err());

        let loaded = store.get_package(package.id()).await.unwrap().unwrap();
        assert_eq!(loaded.delivery_status(), DeliveryStatus::Pending);
        assert!(store.outbox_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_pending_outbox_ordering_and_marking() {
        let store = InMemoryStore::new();
        let mut package = new_package(DriverId::new(), "PKG-1");
        commit_new(&store, &mut package).await;

        package.set_delivery_order(1).unwrap();
        package.mark_in_transit().unwrap();
        package.mark_failed().unwrap();
        let mut uow = UnitOfWork::new();
        uow.save_package(&mut package).unwrap();
        store.commit(uow).await.unwrap();

        let pending = store.pending_outbox_messages(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].occurred_on_utc <= pending[1].occurred_on_utc);
        assert_eq!(store.pending_outbox_messages(1).await.unwrap().len(), 1);

        store
            .mark_outbox_failed(pending[0].id, "broker down")
            .await
            .unwrap();
        store
            .mark_outbox_failed(pending[0].id, "still down")
            .await
            .unwrap();
        let still_pending = store.pending_outbox_messages(10).await.unwrap();
        assert_eq!(still_pending[0].error.as_deref(), Some("still down"));

        store
            .mark_outbox_processed(pending[0].id, Utc::now())
            .await
            .unwrap();
        let remaining = store.pending_outbox_messages(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, pending[1].id);

        let all = store.outbox_messages().await;
        let processed = all.iter().find(|m| m.id == pending[0].id).unwrap();
        assert!(processed.error.is_none());
        assert!(processed.processed_on_utc.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_outbox_ids_are_ignored() {
        let store = InMemoryStore::new();
        let mut package = new_package(DriverId::new(), "PKG-1");
        package.set_delivery_order(1).unwrap();
        package.mark_in_transit().unwrap();

        let mut uow = UnitOfWork::new();
        uow.add_package(&mut package).unwrap();
        store.commit(uow.clone()).await.unwrap();
        store.commit(uow).await.unwrap();

        assert_eq!(store.outbox_messages().await.len(), 1);
    }

    #[tokio::test]
    async fn test_drivers_listed_by_name() {
        let store = InMemoryStore::new();
        let mut uow = UnitOfWork::new();
        uow.save_driver(&Driver::new(DriverId::new(), "Zed").unwrap());
        uow.save_driver(&Driver::new(DriverId::new(), "Ann").unwrap());
        store.commit(uow).await.unwrap();

        let names: Vec<_> = store
            .list_drivers()
            .await
            .unwrap()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(names, vec!["Ann", "Zed"]);
    }

    #[tokio::test]
    async fn test_driver_loads_and_route_order() {
        let store = InMemoryStore::new();
        let busy = DriverId::new();
        let idle = DriverId::new();

        let mut second = new_package(busy, "B");
        second.set_delivery_order(2).unwrap();
        let mut first = new_package(busy, "A");
        first.set_delivery_order(1).unwrap();
        commit_new(&store, &mut second).await;
        commit_new(&store, &mut first).await;

        let today = Utc::now().date_naive();
        let loads = store.driver_delivery_loads(today).await.unwrap();
        assert_eq!(
            loads,
            vec![DriverDeliveryLoad {
                driver_id: busy,
                packages_count: 2
            }]
        );
        assert!(!loads.iter().any(|l| l.driver_id == idle));

        let tomorrow = today + Duration::days(1);
        assert!(store.driver_delivery_loads(tomorrow).await.unwrap().is_empty());

        let route = store.packages_by_driver_and_date(busy, today).await.unwrap();
        let numbers: Vec<_> = route.iter().map(|p| p.number()).collect();
        assert_eq!(numbers, vec!["A", "B"]);

        store.set_fail_loads(true).await;
        assert!(store.driver_delivery_loads(today).await.is_err());
    }
}
