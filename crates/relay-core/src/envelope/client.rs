//! Envelopes received from client connections.

use super::Conversation;
use serde::{Deserialize, Serialize};

/// An envelope as written by a client on its connection
///
/// Anything that does not match one of these variants fails to parse, so
/// unknown kinds never reach the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEnvelope {
    /// A chat message addressed to another client
    MessageSent { message: OutgoingMessage },
    /// A new conversation was created by the client
    ConversationCreated { conversation: Conversation },
}

/// Message body as sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Recipient name, used as the routing key
    pub to: String,
    /// Sender as claimed by the client; never trusted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub text: String,
}

impl ClientEnvelope {
    /// Parse a text frame
    pub fn from_json(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The wire discriminant of this envelope
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MessageSent { .. } => super::MESSAGE_SENT,
            Self::ConversationCreated { .. } => super::CONVERSATION_CREATED,
        }
    }
}
