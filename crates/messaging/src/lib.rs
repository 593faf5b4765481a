//! Broker integration for package delivery tracking.
//!
//! This crate provides:
//! - [`Broker`] / [`BrokerChannel`] port with [`InMemoryBroker`] and [`RabbitMqBroker`] backends
//! - [`OutboxRelay`] publishing pending outbox messages on an interval
//! - [`DispatchConsumer`] turning upstream dispatch messages into assigned packages
//! - [`BrokerConfig`] loaded from environment variables

pub mod broker;
pub mod config;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod payload;
pub mod rabbitmq;
pub mod relay;

pub use broker::{
    Acknowledger, Broker, BrokerChannel, Delivery, DeliveryStream, OutgoingMessage,
};
pub use config::BrokerConfig;
pub use consumer::{ConsumerConfig, DispatchConsumer, DispatchOutcome};
pub use error::{MessagingError, Result};
pub use memory::{InMemoryBroker, SettledDelivery, Settlement};
pub use payload::{
    DEFAULT_PATIENT_PHONE, DispatchPayload, MalformedPayload, PackageDispatch, PayloadViolation,
};
pub use rabbitmq::RabbitMqBroker;
pub use relay::{OutboxRelay, RelayConfig, RelayCycle};
