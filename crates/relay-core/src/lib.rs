//! # relay-core
//!
//! Domain layer for the message relay: the envelope types exchanged with
//! clients and the broker, the pure translation rules between them, and the
//! broker port that infrastructure crates implement.
//! This crate has zero dependencies on infrastructure (broker client, web framework, etc.).

pub mod envelope;
pub mod error;
pub mod traits;
pub mod translate;

// Re-export commonly used types at crate root
pub use envelope::{ClientEnvelope, Conversation, OutgoingMessage, RelayEnvelope, RelayedMessage};
pub use error::{BrokerError, TranslateError};
pub use traits::{BrokerChannel, BrokerResult, Consumer, ConsumerTag, Delivery, DeliveryStream};
pub use translate::{inbound, outbound, Publication};
