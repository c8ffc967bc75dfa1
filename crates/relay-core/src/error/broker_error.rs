//! Errors reported by broker channel implementations.

use thiserror::Error;

/// Broker channel errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Unknown delivery tag: {0}")]
    UnknownDelivery(u64),

    #[error("Broker channel closed")]
    Closed,

    #[error("Broker channel lost: {0}")]
    Lost(String),
}

impl BrokerError {
    /// Check if the error means the channel is unusable for every session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Closed | Self::Lost(_))
    }
}
