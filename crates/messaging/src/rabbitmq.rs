use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    acker::Acker,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    uri::{AMQPAuthority, AMQPUri, AMQPUserInfo},
};
use uuid::Uuid;

use crate::{
    BrokerConfig, MessagingError, Result,
    broker::{Acknowledger, Broker, BrokerChannel, Delivery, DeliveryStream, OutgoingMessage},
};

/// AMQP 0-9-1 broker backed by `lapin`.
///
/// When topology declaration is enabled every channel declares the durable
/// topic exchange on connect, and subscriptions also declare and bind their
/// durable queue with the input routing key.
#[derive(Debug, Clone)]
pub struct RabbitMqBroker {
    config: BrokerConfig,
}

impl RabbitMqBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn uri(&self) -> AMQPUri {
        AMQPUri {
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.config.username.clone(),
                    password: self.config.password.clone(),
                },
                host: self.config.host.clone(),
                port: self.config.port,
            },
            vhost: self.config.vhost.clone(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Broker for RabbitMqBroker {
    #[tracing::instrument(skip(self), fields(host = %self.config.host, port = self.config.port))]
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>> {
        let connection = Connection::connect_uri(self.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| MessagingError::Connection(e.to_string()))?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        if self.config.declare_topology {
            channel
                .exchange_declare(
                    &self.config.exchange,
                    ExchangeKind::Topic,
                    ExchangeDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
        }

        tracing::info!("connected to RabbitMQ");
        Ok(Box::new(RabbitMqChannel {
            connection,
            channel,
            exchange: self.config.exchange.clone(),
            input_routing_key: self.config.input_routing_key.clone(),
            declare_topology: self.config.declare_topology,
        }))
    }
}

struct RabbitMqChannel {
    connection: Connection,
    channel: Channel,
    exchange: String,
    input_routing_key: String,
    declare_topology: bool,
}

#[async_trait]
impl BrokerChannel for RabbitMqChannel {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<()> {
        let timestamp = u64::try_from(message.timestamp.timestamp()).unwrap_or_default();
        let properties = BasicProperties::default()
            .with_message_id(message.message_id.clone().into())
            .with_kind(message.message_type.into())
            .with_content_type("application/json".into())
            .with_delivery_mode(2)
            .with_timestamp(timestamp);

        let confirmation = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.payload,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(MessagingError::Publish(format!(
                "broker nacked message {}",
                message.message_id
            )));
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream> {
        self.channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;

        if self.declare_topology {
            self.channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await?;
            self.channel
                .queue_bind(
                    queue,
                    &self.exchange,
                    &self.input_routing_key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("logistics-{}", Uuid::new_v4()),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| MessagingError::Consume(e.to_string()))?;

        let deliveries = consumer.map(|item| {
            item.map(|delivery| {
                let message_id = delivery
                    .properties
                    .message_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string());
                Delivery::new(
                    delivery.data,
                    message_id,
                    delivery.redelivered,
                    Box::new(RabbitMqAcker(delivery.acker)),
                )
            })
            .map_err(MessagingError::from)
        });

        Ok(Box::pin(deliveries))
    }

    async fn close(&self) -> Result<()> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await?;
        }
        if self.connection.status().connected() {
            self.connection.close(200, "OK").await?;
        }
        Ok(())
    }
}

struct RabbitMqAcker(Acker);

#[async_trait]
impl Acknowledger for RabbitMqAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| MessagingError::Ack(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                multiple: false,
            })
            .await
            .map_err(|e| MessagingError::Ack(e.to_string()))
    }
}
