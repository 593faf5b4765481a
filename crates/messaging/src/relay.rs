//! Publishes pending outbox messages to the broker.

use std::time::{Duration, Instant};

use chrono::Utc;
use store::{OutboxMessage, OutboxStore};
use tokio_util::sync::CancellationToken;

use crate::{
    BrokerConfig, Result,
    broker::{Broker, BrokerChannel, OutgoingMessage},
};

/// Settings for the outbox relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Exchange every message is published to.
    pub exchange: String,

    /// Routing key used when a message has no event name.
    pub fallback_routing_key: String,

    /// Maximum messages read per cycle.
    pub batch_size: usize,

    /// Pause between cycles.
    pub interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from(&BrokerConfig::default())
    }
}

impl From<&BrokerConfig> for RelayConfig {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            exchange: config.exchange.clone(),
            fallback_routing_key: config.output_routing_key.clone(),
            batch_size: config.outbox_batch_size,
            interval: config.outbox_publish_interval,
        }
    }
}

/// What a single relay cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayCycle {
    pub fetched: usize,
    pub published: usize,
    pub failed: usize,
}

/// Moves outbox messages from the store to the broker.
///
/// Holds one broker channel across cycles. After a cycle with any publish
/// failure the channel is dropped and a fresh one is opened on the next
/// cycle. A message is marked processed only after the broker accepted it,
/// so a crash between the two causes a duplicate publish rather than a loss.
pub struct OutboxRelay<S, B>
where
    S: OutboxStore,
    B: Broker,
{
    store: S,
    broker: B,
    config: RelayConfig,
    channel: Option<Box<dyn BrokerChannel>>,
    connections: u64,
    shutdown: CancellationToken,
}

impl<S, B> OutboxRelay<S, B>
where
    S: OutboxStore,
    B: Broker,
{
    /// Creates a relay; no connection is opened until the first cycle with work.
    pub fn new(store: S, broker: B, config: RelayConfig) -> Self {
        Self {
            store,
            broker,
            config,
            channel: None,
            connections: 0,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns true if the relay currently holds an open channel.
    pub fn is_connected(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    /// Runs one read-publish-mark cycle.
    ///
    /// Individual publish failures are recorded on their messages and do not
    /// stop the rest of the batch. Store and connection errors abort the
    /// cycle and are returned.
    #[tracing::instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn run_once(&mut self) -> Result<RelayCycle> {
        let started = Instant::now();
        let pending = self
            .store
            .pending_outbox_messages(self.config.batch_size)
            .await?;
        if pending.is_empty() {
            return Ok(RelayCycle::default());
        }

        self.ensure_channel().await?;
        let Some(channel) = self.channel.as_deref() else {
            return Ok(RelayCycle::default());
        };

        let mut cycle = RelayCycle {
            fetched: pending.len(),
            ..RelayCycle::default()
        };

        for message in &pending {
            match channel.publish(self.outgoing(message)).await {
                Ok(()) => {
                    self.store
                        .mark_outbox_processed(message.id, Utc::now())
                        .await?;
                    cycle.published += 1;
                    metrics::counter!("outbox_messages_published_total").increment(1);
                }
                Err(e) => {
                    tracing::error!(
                        outbox_message_id = %message.id,
                        error = %e,
                        "failed to publish outbox message"
                    );
                    self.store
                        .mark_outbox_failed(message.id, &e.to_string())
                        .await?;
                    cycle.failed += 1;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                }
            }
        }

        if cycle.failed > 0 {
            self.teardown().await;
        }

        metrics::histogram!("outbox_relay_cycle_seconds").record(started.elapsed().as_secs_f64());
        tracing::debug!(
            published = cycle.published,
            failed = cycle.failed,
            "outbox relay cycle finished"
        );
        Ok(cycle)
    }

    /// Runs cycles on the configured interval until `token` is cancelled.
    ///
    /// A cycle in progress when cancellation arrives is allowed to finish,
    /// except for a connection attempt that has not completed yet.
    pub async fn run(&mut self, token: CancellationToken) {
        self.shutdown = token.clone();
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            "outbox relay started"
        );

        while !token.is_cancelled() {
            if let Err(e) = self.run_once().await {
                tracing::error!(error = %e, "outbox relay cycle failed");
                self.teardown().await;
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.interval) => {}
                () = token.cancelled() => break,
            }
        }

        self.teardown().await;
        tracing::info!("outbox relay stopped");
    }

    fn outgoing(&self, message: &OutboxMessage) -> OutgoingMessage {
        let routing_key = if message.event_name.trim().is_empty() {
            self.config.fallback_routing_key.clone()
        } else {
            message.event_name.clone()
        };

        OutgoingMessage {
            exchange: self.config.exchange.clone(),
            routing_key,
            message_id: message.id.to_string(),
            message_type: message.message_type.clone(),
            payload: message.content.as_bytes().to_vec(),
            timestamp: Utc::now(),
        }
    }

    async fn ensure_channel(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        self.teardown().await;
        let channel = tokio::select! {
            channel = self.broker.connect() => channel?,
            () = self.shutdown.cancelled() => return Ok(()),
        };
        if self.connections > 0 {
            metrics::counter!("outbox_relay_reconnects_total").increment(1);
            tracing::info!("outbox relay reconnected to broker");
        }
        self.connections += 1;
        self.channel = Some(channel);
        Ok(())
    }

    async fn teardown(&mut self) {
        if let Some(channel) = self.channel.take()
            && let Err(e) = channel.close().await
        {
            tracing::debug!(error = %e, "error closing relay channel");
        }
    }
}
