//! Background worker for package delivery tracking.
//!
//! Runs the outbox relay and the dispatch consumer as two independent tasks
//! sharing only the store, and serves health and Prometheus metrics over HTTP.

pub mod config;
pub mod routes;

use axum::Router;
use axum::routing::get;
use messaging::{Broker, BrokerConfig, ConsumerConfig, DispatchConsumer, OutboxRelay, RelayConfig};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{DeliveryStore, DriverLoadReader, OutboxStore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Creates the HTTP router for health and metrics.
pub fn create_app(metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

/// Handles to the running background loops.
pub struct BackgroundTasks {
    relay: JoinHandle<()>,
    consumer: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Waits for both loops to exit. Call after cancelling their token.
    pub async fn join(self) {
        let tasks = [
            ("outbox_relay", self.relay),
            ("dispatch_consumer", self.consumer),
        ];
        for (task, handle) in tasks {
            if let Err(e) = handle.await {
                tracing::error!(task, error = %e, "background task ended abnormally");
            }
        }
    }
}

/// Spawns the outbox relay and the dispatch consumer.
///
/// Each loop opens its own broker connection; both stop when `token` is
/// cancelled, letting in-flight work finish first.
pub fn spawn_background<S, B>(
    store: S,
    broker: B,
    config: &BrokerConfig,
    token: CancellationToken,
) -> BackgroundTasks
where
    S: DeliveryStore + OutboxStore + DriverLoadReader + Clone + 'static,
    B: Broker + Clone + 'static,
{
    let mut relay = OutboxRelay::new(store.clone(), broker.clone(), RelayConfig::from(config));
    let relay_token = token.clone();
    let relay = tokio::spawn(async move { relay.run(relay_token).await });

    let consumer = DispatchConsumer::new(store, ConsumerConfig::from(config));
    let consumer = tokio::spawn(async move { consumer.run(&broker, token).await });

    BackgroundTasks { relay, consumer }
}
