//! AMQP 0-9-1 broker channel

mod channel;

pub use channel::{AmqpChannel, AmqpConfig};
