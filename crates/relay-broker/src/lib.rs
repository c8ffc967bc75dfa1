//! # relay-broker
//!
//! Implementations of the relay's broker port.
//!
//! ## Features
//!
//! - **AMQP**: [`AmqpChannel`] over a single `lapin` channel, for RabbitMQ and compatible brokers
//! - **In-process**: [`MemoryBroker`], a topic exchange living inside the process,
//!   with a journal of publishes, acks and cancellations
//!
//! ## Example
//!
//! ```ignore
//! use relay_broker::{AmqpChannel, AmqpConfig};
//!
//! let channel = AmqpChannel::connect(&AmqpConfig::from(&config.broker)).await?;
//! channel.declare_exchange("messages").await?;
//! ```

pub mod amqp;
pub mod memory;

pub use amqp::{AmqpChannel, AmqpConfig};
pub use memory::{topic_matches, BrokerOp, MemoryBroker, PublishedMessage};
