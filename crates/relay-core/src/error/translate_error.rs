//! Errors raised while translating envelopes.

use thiserror::Error;

/// Translation errors
///
/// Every variant means the input is dropped; none of them is fatal to a session.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Message has no recipient")]
    MissingRecipient,

    #[error("Conversation {0} has no routable participants")]
    NoParticipants(String),

    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl TranslateError {
    /// Check if the input could not be parsed at all
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Get error code for log fields
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "MALFORMED",
            Self::MissingRecipient => "MISSING_RECIPIENT",
            Self::NoParticipants(_) => "NO_PARTICIPANTS",
            Self::Encode(_) => "ENCODE",
        }
    }
}
