//! Consumes "package dispatch created" messages and assigns each new package
//! to a driver.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use application::{
    DriverSelectionEngine, DriverService, PackageService, SelectionCriteria, SelectionStrategy,
};
use chrono::Utc;
use futures_util::{FutureExt, StreamExt, TryStreamExt};
use store::{DeliveryStore, DriverLoadReader};
use tokio_util::sync::CancellationToken;

use crate::{
    BrokerConfig, Result,
    broker::{Broker, BrokerChannel, Delivery},
    payload::DispatchPayload,
};

/// Settings for the dispatch consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub queue: String,
    /// Maximum unacknowledged deliveries, which is also the number handled
    /// concurrently.
    pub prefetch: u16,
    /// Wait before re-establishing a lost subscription.
    pub reconnect_delay: Duration,
    pub strategy: SelectionStrategy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for ConsumerConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            queue: config.input_queue.clone(),
            prefetch: config.prefetch_count,
            reconnect_delay: config.reconnect_delay,
            strategy: config.driver_selection_strategy,
        }
    }
}

/// Result of handling one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The package was created (or already existed).
    Created,
    /// The body was not a usable JSON payload.
    Malformed,
    /// The payload broke an acceptance rule.
    Invalid,
    /// Package creation failed in a way that will never succeed.
    Rejected,
    /// No driver could be assigned.
    NoDriver,
    /// Package creation failed transiently.
    Retry,
    /// Handling panicked.
    Panicked,
}

impl DispatchOutcome {
    /// Returns true if the message should be ACKed. Every other outcome is
    /// NACKed with requeue.
    pub fn acknowledges(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::Created
                | DispatchOutcome::Malformed
                | DispatchOutcome::Invalid
                | DispatchOutcome::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Created => "created",
            DispatchOutcome::Malformed => "malformed",
            DispatchOutcome::Invalid => "invalid",
            DispatchOutcome::Rejected => "rejected",
            DispatchOutcome::NoDriver => "no_driver",
            DispatchOutcome::Retry => "retry",
            DispatchOutcome::Panicked => "panicked",
        }
    }
}

/// Durable, manually acknowledged subscription creating packages from
/// upstream dispatch messages.
///
/// Redelivery is unbounded: a message that keeps finding no driver is
/// requeued until one is registered.
pub struct DispatchConsumer<S>
where
    S: DeliveryStore + DriverLoadReader + Clone,
{
    packages: PackageService<S>,
    drivers: DriverService<S>,
    engine: DriverSelectionEngine<S>,
    config: ConsumerConfig,
}

impl<S> DispatchConsumer<S>
where
    S: DeliveryStore + DriverLoadReader + Clone,
{
    pub fn new(store: S, config: ConsumerConfig) -> Self {
        Self {
            packages: PackageService::new(store.clone()),
            drivers: DriverService::new(store.clone()),
            engine: DriverSelectionEngine::new(store),
            config,
        }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Handles one message body and decides its outcome. Never fails: every
    /// error, including a panic, maps to an outcome.
    pub async fn handle(&self, body: &[u8]) -> DispatchOutcome {
        let outcome = match AssertUnwindSafe(self.process(body)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(queue = %self.config.queue, "panic while handling dispatch message");
                DispatchOutcome::Panicked
            }
        };

        metrics::counter!("dispatch_messages_total", "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    /// Handles a delivery and settles it with the broker.
    #[tracing::instrument(
        skip(self, delivery),
        fields(message_id = ?delivery.message_id, redelivered = delivery.redelivered)
    )]
    pub async fn handle_delivery(&self, delivery: Delivery) -> Result<DispatchOutcome> {
        let outcome = self.handle(&delivery.body).await;
        if outcome.acknowledges() {
            delivery.ack().await?;
        } else {
            delivery.nack(true).await?;
        }
        Ok(outcome)
    }

    /// Consumes until `token` is cancelled, re-establishing the subscription
    /// after the reconnect delay whenever it breaks.
    pub async fn run<B: Broker>(&self, broker: &B, token: CancellationToken) {
        tracing::info!(queue = %self.config.queue, "dispatch consumer started");

        while !token.is_cancelled() {
            match self.consume(broker, &token).await {
                Ok(()) if token.is_cancelled() => break,
                Ok(()) => tracing::warn!(
                    queue = %self.config.queue,
                    delay_secs = self.config.reconnect_delay.as_secs(),
                    "subscription ended, reconnecting"
                ),
                Err(e) => tracing::error!(
                    queue = %self.config.queue,
                    error = %e,
                    delay_secs = self.config.reconnect_delay.as_secs(),
                    "dispatch consumer failed, reconnecting"
                ),
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
                () = token.cancelled() => break,
            }
        }

        tracing::info!(queue = %self.config.queue, "dispatch consumer stopped");
    }

    async fn consume<B: Broker>(&self, broker: &B, token: &CancellationToken) -> Result<()> {
        let channel = tokio::select! {
            channel = broker.connect() => channel?,
            () = token.cancelled() => return Ok(()),
        };
        let result = self.drain(channel.as_ref(), token).await;
        if let Err(e) = channel.close().await {
            tracing::debug!(error = %e, "error closing consumer channel");
        }
        result
    }

    async fn drain(&self, channel: &dyn BrokerChannel, token: &CancellationToken) -> Result<()> {
        let deliveries = tokio::select! {
            deliveries = channel.consume(&self.config.queue, self.config.prefetch) => deliveries?,
            () = token.cancelled() => return Ok(()),
        };
        tracing::info!(
            queue = %self.config.queue,
            prefetch = self.config.prefetch,
            "consuming dispatch messages"
        );

        deliveries
            .take_until(token.cancelled())
            .try_for_each_concurrent(usize::from(self.config.prefetch.max(1)), |delivery| {
                async move { self.handle_delivery(delivery).await.map(|_| ()) }
            })
            .await
    }

    async fn process(&self, body: &[u8]) -> DispatchOutcome {
        let payload = match DispatchPayload::parse(body) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    queue = %self.config.queue,
                    error = %e,
                    body = %String::from_utf8_lossy(body),
                    "discarding malformed message"
                );
                return DispatchOutcome::Malformed;
            }
        };

        let dispatch = match payload.validate(Utc::now().date_naive()) {
            Ok(dispatch) => dispatch,
            Err(reason) => {
                tracing::warn!(
                    queue = %self.config.queue,
                    %reason,
                    body = %String::from_utf8_lossy(body),
                    "discarding invalid message"
                );
                return DispatchOutcome::Invalid;
            }
        };
        let package_id = dispatch.id;

        let drivers = match self.drivers.list_drivers().await {
            Ok(drivers) if !drivers.is_empty() => drivers,
            Ok(_) => {
                tracing::warn!(%package_id, "no drivers available to assign package");
                return DispatchOutcome::NoDriver;
            }
            Err(e) => {
                tracing::error!(%package_id, error = %e, "failed to load drivers");
                return DispatchOutcome::Retry;
            }
        };

        let criteria = SelectionCriteria {
            delivery_date: dispatch.delivery_date,
            delivery_latitude: dispatch.delivery_latitude,
            delivery_longitude: dispatch.delivery_longitude,
            strategy: self.config.strategy,
        };
        let Some(driver_id) = self
            .engine
            .select(&drivers, &criteria)
            .await
            .map(|driver| driver.id())
        else {
            tracing::error!(
                %package_id,
                strategy = %self.config.strategy,
                "driver selection returned no driver"
            );
            return DispatchOutcome::NoDriver;
        };

        match self
            .packages
            .create_package(dispatch.into_command(driver_id))
            .await
        {
            Ok(_) => {
                tracing::info!(%package_id, %driver_id, "package created and assigned");
                DispatchOutcome::Created
            }
            Err(e) if !e.is_retryable() => {
                tracing::warn!(
                    %package_id,
                    code = e.code(),
                    error = %e,
                    "discarding message, package creation cannot succeed"
                );
                DispatchOutcome::Rejected
            }
            Err(e) => {
                tracing::error!(
                    %package_id,
                    code = e.code(),
                    error = %e,
                    "package creation failed, requeueing"
                );
                DispatchOutcome::Retry
            }
        }
    }
}
