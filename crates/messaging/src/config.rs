//! Broker configuration loaded from environment variables.

use std::time::Duration;

use application::SelectionStrategy;

/// RabbitMQ connection, topology and background loop settings.
///
/// Reads from environment variables:
/// - `RABBITMQ_HOST` / `RABBITMQ_PORT` (default: `"localhost"` / `5672`)
/// - `RABBITMQ_USERNAME` / `RABBITMQ_PASSWORD` (default: `"guest"` / `"guest"`)
/// - `RABBITMQ_VHOST` (default: `"/"`)
/// - `RABBITMQ_EXCHANGE` (default: `"outbox.events"`)
/// - `RABBITMQ_INPUT_QUEUE` / `RABBITMQ_INPUT_ROUTING_KEY`
/// - `RABBITMQ_OUTPUT_ROUTING_KEY`
/// - `RABBITMQ_DECLARE_TOPOLOGY` (default: `false`)
/// - `RABBITMQ_RECONNECT_DELAY_SECS` (default: `10`, at least 1)
/// - `RABBITMQ_PREFETCH_COUNT` (default: `10`)
/// - `OUTBOX_BATCH_SIZE` (default: `50`)
/// - `OUTBOX_PUBLISH_INTERVAL_SECS` (default: `5`, at least 1)
/// - `DRIVER_SELECTION_STRATEGY` (default: `NearestToDelivery`)
///
/// Values that fail to parse fall back to their defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    pub exchange: String,
    pub input_queue: String,
    pub input_routing_key: String,
    pub output_routing_key: String,
    pub declare_topology: bool,
    pub reconnect_delay: Duration,
    pub prefetch_count: u16,
    pub outbox_batch_size: usize,
    pub outbox_publish_interval: Duration,
    pub driver_selection_strategy: SelectionStrategy,
}

const DEFAULT_INPUT_QUEUE: &str = "produccion.paquete-despacho-creado";

impl BrokerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let string = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or(default)
        };

        Self {
            host: string("RABBITMQ_HOST", defaults.host),
            port: lookup("RABBITMQ_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            username: string("RABBITMQ_USERNAME", defaults.username),
            password: string("RABBITMQ_PASSWORD", defaults.password),
            vhost: string("RABBITMQ_VHOST", defaults.vhost),
            exchange: string("RABBITMQ_EXCHANGE", defaults.exchange),
            input_queue: string("RABBITMQ_INPUT_QUEUE", defaults.input_queue),
            input_routing_key: string("RABBITMQ_INPUT_ROUTING_KEY", defaults.input_routing_key),
            output_routing_key: string(
                "RABBITMQ_OUTPUT_ROUTING_KEY",
                defaults.output_routing_key,
            ),
            declare_topology: lookup("RABBITMQ_DECLARE_TOPOLOGY")
                .and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
                .unwrap_or(defaults.declare_topology),
            reconnect_delay: secs("RABBITMQ_RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            prefetch_count: lookup("RABBITMQ_PREFETCH_COUNT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.prefetch_count),
            outbox_batch_size: lookup("OUTBOX_BATCH_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.outbox_batch_size),
            outbox_publish_interval: secs(
                "OUTBOX_PUBLISH_INTERVAL_SECS",
                defaults.outbox_publish_interval,
            ),
            driver_selection_strategy: lookup("DRIVER_SELECTION_STRATEGY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.driver_selection_strategy),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            exchange: "outbox.events".to_string(),
            input_queue: DEFAULT_INPUT_QUEUE.to_string(),
            input_routing_key: DEFAULT_INPUT_QUEUE.to_string(),
            output_routing_key: store::PACKAGE_STATUS_UPDATED_EVENT_NAME.to_string(),
            declare_topology: false,
            reconnect_delay: Duration::from_secs(10),
            prefetch_count: 10,
            outbox_batch_size: 50,
            outbox_publish_interval: Duration::from_secs(5),
            driver_selection_strategy: SelectionStrategy::NearestToDelivery,
        }
    }
}
