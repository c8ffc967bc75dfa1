//! Ports implemented by infrastructure crates

mod broker;

pub use broker::{BrokerChannel, BrokerResult, Consumer, ConsumerTag, Delivery, DeliveryStream};
