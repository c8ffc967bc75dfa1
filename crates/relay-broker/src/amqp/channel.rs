//! AMQP channel using lapin.
//!
//! One connection, one channel, shared by every session. A channel exception
//! on any call closes the channel for all of them, so losing it is reported
//! through [`BrokerChannel::closed`].

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use relay_core::{BrokerChannel, BrokerError, BrokerResult, Consumer, ConsumerTag, Delivery};
use std::sync::Arc;
use tokio::sync::watch;

/// AMQP connection configuration
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    /// AMQP URI (e.g., `amqp://localhost:5672`)
    pub url: String,
}

impl Default for AmqpConfig {
    fn default() -> Self {
        Self {
            url: "amqp://localhost:5672".to_string(),
        }
    }
}

impl From<&relay_common::BrokerConfig> for AmqpConfig {
    fn from(config: &relay_common::BrokerConfig) -> Self {
        Self { url: config.url() }
    }
}

/// Broker channel backed by an AMQP connection
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
    /// Reason the channel was lost, once it was
    lost: Arc<watch::Sender<Option<String>>>,
}

impl AmqpChannel {
    /// Connect to the broker and open the shared channel
    pub async fn connect(config: &AmqpConfig) -> BrokerResult<Self> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let lost = Arc::new(watch::channel(None).0);

        connection.on_error({
            let lost = lost.clone();
            move |err| {
                tracing::error!(error = %err, "AMQP connection error");
                lost.send_replace(Some(err.to_string()));
            }
        });

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        channel.on_error({
            let lost = lost.clone();
            move |err| {
                tracing::error!(error = %err, "AMQP channel error");
                lost.send_replace(Some(err.to_string()));
            }
        });

        tracing::info!(channel_id = channel.id(), "AMQP channel opened");

        Ok(Self {
            connection,
            channel,
            lost,
        })
    }

    /// Map a failed call, noting when it took the channel down
    fn fail(&self, err: lapin::Error) -> BrokerError {
        let reason = err.to_string();
        let err = channel_error(err);

        if err.is_fatal() || !self.channel.status().connected() {
            self.lost.send_if_modified(|lost| {
                if lost.is_some() {
                    return false;
                }
                tracing::error!(error = %reason, "AMQP channel closed by broker");
                *lost = Some(reason);
                true
            });
        }

        err
    }
}

impl std::fmt::Debug for AmqpChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpChannel")
            .field("channel_id", &self.channel.id())
            .field("connection", &self.connection.status().state())
            .finish()
    }
}

fn channel_error(err: lapin::Error) -> BrokerError {
    match err {
        lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
            BrokerError::Closed
        }
        other => BrokerError::Channel(other.to_string()),
    }
}

fn into_delivery(delivery: lapin::message::Delivery) -> Delivery {
    Delivery {
        delivery_tag: delivery.delivery_tag,
        exchange: delivery.exchange.as_str().to_owned(),
        routing_key: delivery.routing_key.as_str().to_owned(),
        redelivered: delivery.redelivered,
        data: delivery.data,
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()> {
        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.fail(e))
    }

    async fn declare_queue(&self, queue: &str) -> BrokerResult<()> {
        let declared = self
            .channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.fail(e))?;

        tracing::trace!(
            queue = %queue,
            messages = declared.message_count(),
            consumers = declared.consumer_count(),
            "Queue declared"
        );

        Ok(())
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> BrokerResult<()> {
        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.fail(e))
    }

    async fn consume(&self, queue: &str) -> BrokerResult<Consumer> {
        let tag = format!("relay-{queue}-{}", uuid::Uuid::new_v4().simple());

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| self.fail(e))?;

        let deliveries = consumer
            .map(|item| item.map(into_delivery).map_err(channel_error))
            .boxed();

        Ok(Consumer::new(ConsumerTag::new(tag), deliveries))
    }

    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> BrokerResult<()> {
        // Confirms are not enabled on this channel, so the returned confirm is not awaited
        let _confirm = self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| self.fail(e))?;

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| self.fail(e))
    }

    async fn cancel(&self, consumer_tag: &ConsumerTag) -> BrokerResult<()> {
        self.channel
            .basic_cancel(consumer_tag.as_str(), BasicCancelOptions::default())
            .await
            .map_err(|e| self.fail(e))
    }

    async fn closed(&self) -> BrokerError {
        let mut lost = self.lost.subscribe();
        let reason = match lost.wait_for(Option::is_some).await {
            Ok(reason) => reason.clone(),
            Err(_) => None,
        };
        reason.map_or(BrokerError::Closed, BrokerError::Lost)
    }
}
