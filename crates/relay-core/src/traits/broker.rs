//! Broker channel port
//!
//! The relay talks to its message broker exclusively through [`BrokerChannel`].
//! One channel is shared by every session, so implementations must accept
//! interleaved calls from many tasks.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::BrokerError;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Stream of deliveries for one consumer; ends when the consumer is cancelled
pub type DeliveryStream = BoxStream<'static, BrokerResult<Delivery>>;

/// Broker-issued handle identifying a consumer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message consumed from a queue, pending acknowledgment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Channel-scoped tag used to acknowledge this delivery
    pub delivery_tag: u64,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published with
    pub routing_key: String,
    /// Whether the broker delivered this message before
    pub redelivered: bool,
    /// Raw message body
    pub data: Vec<u8>,
}

/// A registered consumer: its tag and the deliveries it receives
pub struct Consumer {
    tag: ConsumerTag,
    deliveries: DeliveryStream,
}

impl Consumer {
    #[must_use]
    pub fn new(tag: ConsumerTag, deliveries: DeliveryStream) -> Self {
        Self { tag, deliveries }
    }

    /// Get the consumer tag
    #[must_use]
    pub fn tag(&self) -> &ConsumerTag {
        &self.tag
    }

    /// Split into tag and delivery stream
    #[must_use]
    pub fn into_parts(self) -> (ConsumerTag, DeliveryStream) {
        (self.tag, self.deliveries)
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer").field("tag", &self.tag).finish()
    }
}

/// Publish/consume primitives of a topic broker
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Assert a durable topic exchange. Repeating the call with the same name is a no-op.
    async fn declare_exchange(&self, exchange: &str) -> BrokerResult<()>;

    /// Assert an auto-delete queue. Repeating the call with the same name is a no-op.
    async fn declare_queue(&self, queue: &str) -> BrokerResult<()>;

    /// Bind a queue to an exchange. Repeating an identical binding does not duplicate it.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> BrokerResult<()>;

    /// Start consuming from a queue
    async fn consume(&self, queue: &str) -> BrokerResult<Consumer>;

    /// Publish a payload to an exchange under a routing key
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> BrokerResult<()>;

    /// Acknowledge a delivery
    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()>;

    /// Cancel a consumer; its delivery stream ends afterwards
    async fn cancel(&self, consumer_tag: &ConsumerTag) -> BrokerResult<()>;

    /// Wait until the channel becomes unusable and return why
    ///
    /// A channel exception raised by any one call closes the channel for
    /// every session sharing it.
    async fn closed(&self) -> BrokerError;
}
