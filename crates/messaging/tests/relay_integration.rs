//! Integration tests for the outbox relay against in-memory backends.

use std::time::Duration;

use application::{CreatePackage, PackageService};
use chrono::Utc;
use common::{DriverId, PackageId, PatientId};
use messaging::{InMemoryBroker, OutboxRelay, RelayConfig, RelayCycle};
use store::{InMemoryStore, OutboxStore, PACKAGE_STATUS_UPDATED_EVENT_NAME};
use tokio_util::sync::CancellationToken;

fn create_cmd(number: &str) -> CreatePackage {
    CreatePackage {
        id: PackageId::new(),
        number: number.to_string(),
        patient_id: PatientId::new(),
        patient_name: "Lucia Vargas".to_string(),
        patient_phone: "+591 71234567".to_string(),
        delivery_address: "Av. Ballivian 1020".to_string(),
        delivery_latitude: -17.39,
        delivery_longitude: -66.16,
        delivery_date: Utc::now().date_naive(),
        driver_id: DriverId::new(),
    }
}

/// Creates `count` packages sent out for delivery, one outbox message each.
async fn seed(store: &InMemoryStore, count: usize) {
    let service = PackageService::new(store.clone());
    for i in 0..count {
        let id = service
            .create_package(create_cmd(&format!("PKG-{i}")))
            .await
            .unwrap();
        service.set_delivery_order(id, 1).await.unwrap();
        service.mark_in_transit(id).await.unwrap();
    }
}

fn relay(
    store: &InMemoryStore,
    broker: &InMemoryBroker,
) -> OutboxRelay<InMemoryStore, InMemoryBroker> {
    OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::default())
}

mod publishing {
    use super::*;

    #[tokio::test]
    async fn publishes_in_occurrence_order_and_marks_processed() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 3).await;
        let queued = store.outbox_messages().await;

        let mut relay = relay(&store, &broker);
        let cycle = relay.run_once().await.unwrap();
        assert_eq!(
            cycle,
            RelayCycle {
                fetched: 3,
                published: 3,
                failed: 0
            }
        );

        let published = broker.published().await;
        let ids: Vec<_> = published.iter().map(|m| m.message_id.clone()).collect();
        let expected: Vec<_> = queued.iter().map(|m| m.id.to_string()).collect();
        assert_eq!(ids, expected);

        let first = &published[0];
        assert_eq!(first.exchange, "outbox.events");
        assert_eq!(first.routing_key, PACKAGE_STATUS_UPDATED_EVENT_NAME);
        assert_eq!(first.message_type, queued[0].message_type);
        assert_eq!(first.payload, queued[0].content.as_bytes());

        assert!(store.pending_outbox_messages(10).await.unwrap().is_empty());
        assert!(
            store
                .outbox_messages()
                .await
                .iter()
                .all(|m| m.processed_on_utc.is_some() && m.error.is_none())
        );
    }

    #[tokio::test]
    async fn empty_outbox_does_not_connect() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();

        let cycle = relay(&store, &broker).run_once().await.unwrap();
        assert_eq!(cycle, RelayCycle::default());
        assert_eq!(broker.connections_opened().await, 0);
    }

    #[tokio::test]
    async fn batch_size_limits_each_cycle() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 3).await;

        let config = RelayConfig {
            batch_size: 2,
            ..RelayConfig::default()
        };
        let mut relay = OutboxRelay::new(store.clone(), broker.clone(), config);

        assert_eq!(relay.run_once().await.unwrap().published, 2);
        assert_eq!(relay.run_once().await.unwrap().published, 1);
        assert_eq!(broker.published().await.len(), 3);
        assert_eq!(broker.connections_opened().await, 1);
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn failed_publish_is_recorded_and_retried_next_cycle() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 3).await;
        let queued = store.outbox_messages().await;
        let failing = queued[0].id.to_string();
        broker.fail_publish_for(&failing).await;

        let mut relay = relay(&store, &broker);
        let cycle = relay.run_once().await.unwrap();
        assert_eq!(cycle.published, 2);
        assert_eq!(cycle.failed, 1);
        assert!(!relay.is_connected());

        let pending = store.pending_outbox_messages(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued[0].id);
        assert!(pending[0].processed_on_utc.is_none());
        assert!(pending[0].error.as_deref().unwrap().contains(&failing));

        broker.allow_publish_for(&failing).await;
        let cycle = relay.run_once().await.unwrap();
        assert_eq!(cycle.published, 1);
        assert!(store.pending_outbox_messages(10).await.unwrap().is_empty());
        assert_eq!(broker.connections_opened().await, 2);
        assert_eq!(broker.channels_closed().await, 1);
    }

    #[tokio::test]
    async fn unreachable_broker_leaves_messages_untouched() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 2).await;
        broker.set_fail_connect(true).await;

        let mut relay = relay(&store, &broker);
        assert!(relay.run_once().await.is_err());

        let pending = store.pending_outbox_messages(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|m| m.error.is_none()));

        broker.set_fail_connect(false).await;
        assert_eq!(relay.run_once().await.unwrap().published, 2);
    }

    #[tokio::test]
    async fn lost_connection_is_replaced_on_next_cycle() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 1).await;

        let mut relay = relay(&store, &broker);
        relay.run_once().await.unwrap();
        assert!(relay.is_connected());

        broker.disconnect_all();
        assert!(!relay.is_connected());

        seed(&store, 1).await;
        assert_eq!(relay.run_once().await.unwrap().published, 1);
        assert_eq!(broker.connections_opened().await, 2);
    }
}

mod background {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn run_publishes_until_cancelled_then_closes() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        seed(&store, 2).await;

        let token = CancellationToken::new();
        let mut relay = OutboxRelay::new(
            store.clone(),
            broker.clone(),
            RelayConfig {
                interval: Duration::from_secs(1),
                ..RelayConfig::default()
            },
        );
        let handle = tokio::spawn({
            let token = token.clone();
            async move { relay.run(token).await }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(broker.published().await.len(), 2);

        seed(&store, 1).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(broker.published().await.len(), 3);

        token.cancel();
        handle.await.unwrap();
        assert_eq!(broker.channels_closed().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_a_stalled_connect() {
        let store = InMemoryStore::new();
        let broker = InMemoryBroker::new();
        broker.set_stall_connect(true).await;
        seed(&store, 1).await;

        let token = CancellationToken::new();
        let mut relay = OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::default());
        let handle = tokio::spawn({
            let token = token.clone();
            async move { relay.run(token).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("relay should stop while connecting")
            .unwrap();

        assert_eq!(broker.connections_opened().await, 0);
        assert_eq!(store.pending_outbox_messages(10).await.unwrap().len(), 1);
    }
}
