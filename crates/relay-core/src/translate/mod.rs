//! Message translation
//!
//! Pure functions between client frames, broker payloads, and relay envelopes.
//! Nothing here touches a connection or the broker.

use crate::envelope::{ClientEnvelope, Conversation, RelayEnvelope, RelayedMessage};
use crate::error::TranslateError;

/// A relay envelope ready to publish under a routing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub routing_key: String,
    pub envelope: RelayEnvelope,
}

impl Publication {
    /// Encode the envelope as a broker payload
    pub fn payload(&self) -> Result<Vec<u8>, TranslateError> {
        self.envelope.to_vec().map_err(TranslateError::Encode)
    }
}

/// Translate a client text frame into the publications it causes
///
/// `sender` is the name of the session the frame arrived on and always
/// replaces any sender the client claims.
///
/// A sent message yields one publication routed to its recipient. A created
/// conversation fans out to each distinct participant, in first-seen order.
pub fn outbound(sender: &str, frame: &str) -> Result<Vec<Publication>, TranslateError> {
    let envelope = ClientEnvelope::from_json(frame).map_err(TranslateError::Malformed)?;

    match envelope {
        ClientEnvelope::MessageSent { message } => {
            if message.to.is_empty() {
                return Err(TranslateError::MissingRecipient);
            }

            Ok(vec![Publication {
                routing_key: message.to,
                envelope: RelayEnvelope::MessageSent {
                    message: RelayedMessage {
                        from: sender.to_string(),
                        text: message.text,
                    },
                },
            }])
        }
        ClientEnvelope::ConversationCreated { conversation } => fan_out(conversation),
    }
}

fn fan_out(conversation: Conversation) -> Result<Vec<Publication>, TranslateError> {
    let mut recipients: Vec<&str> = Vec::with_capacity(conversation.participants.len());
    for participant in &conversation.participants {
        if !participant.is_empty() && !recipients.contains(&participant.as_str()) {
            recipients.push(participant);
        }
    }

    if recipients.is_empty() {
        return Err(TranslateError::NoParticipants(conversation.id));
    }

    let publications = recipients
        .iter()
        .map(|recipient| Publication {
            routing_key: (*recipient).to_string(),
            envelope: RelayEnvelope::ConversationCreated {
                conversation: conversation.clone(),
            },
        })
        .collect();

    Ok(publications)
}

/// Translate a consumed broker payload into the envelope delivered to the client
///
/// Fields are forwarded unchanged; anything beyond the two known shapes is
/// rejected rather than passed through.
pub fn inbound(payload: &[u8]) -> Result<RelayEnvelope, TranslateError> {
    let envelope = RelayEnvelope::from_slice(payload).map_err(TranslateError::Malformed)?;

    Ok(match envelope {
        RelayEnvelope::MessageSent { message } => RelayEnvelope::MessageSent {
            message: RelayedMessage {
                from: message.from,
                text: message.text,
            },
        },
        RelayEnvelope::ConversationCreated { conversation } => RelayEnvelope::ConversationCreated {
            conversation: Conversation {
                id: conversation.id,
                participants: conversation.participants,
            },
        },
    })
}
