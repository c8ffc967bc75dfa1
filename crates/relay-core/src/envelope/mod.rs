//! Envelope types
//!
//! Both envelope families share the same JSON shape, a `type` discriminant plus
//! one payload object. They differ only in which routing fields are present:
//! clients send `to`, the relay emits `from`.

mod client;
mod relay;

pub use client::{ClientEnvelope, OutgoingMessage};
pub use relay::{Conversation, RelayEnvelope, RelayedMessage};

/// Discriminant for a sent message
pub const MESSAGE_SENT: &str = "MESSAGE_SENT";
/// Discriminant for a created conversation
pub const CONVERSATION_CREATED: &str = "CONVERSATION_CREATED";
