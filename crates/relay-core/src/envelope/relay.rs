//! Envelopes published to the broker and delivered to clients.

use serde::{Deserialize, Serialize};

/// An envelope as published by the relay and delivered to a recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayEnvelope {
    /// A chat message with its verified sender
    MessageSent { message: RelayedMessage },
    /// A conversation announcement
    ConversationCreated { conversation: Conversation },
}

/// Message body after the relay stamped the sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedMessage {
    pub from: String,
    pub text: String,
}

/// Conversation body, identical in every direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<String>,
}

impl RelayEnvelope {
    /// Create a sent-message envelope
    #[must_use]
    pub fn message_sent(from: impl Into<String>, text: impl Into<String>) -> Self {
        Self::MessageSent {
            message: RelayedMessage {
                from: from.into(),
                text: text.into(),
            },
        }
    }

    /// Create a conversation-created envelope
    #[must_use]
    pub fn conversation_created(id: impl Into<String>, participants: Vec<String>) -> Self {
        Self::ConversationCreated {
            conversation: Conversation {
                id: id.into(),
                participants,
            },
        }
    }

    /// Decode a broker payload
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to JSON bytes
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
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
