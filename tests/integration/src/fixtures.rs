//! Test fixtures and data generators
//!
//! Provides unique client names and envelope builders.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Get a client name not used by any other test
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}{}", unique_suffix())
}

/// Client frame sending `text` to `to`
pub fn message_sent(to: &str, text: &str) -> Value {
    json!({
        "type": "MESSAGE_SENT",
        "message": { "to": to, "text": text }
    })
}

/// Envelope a recipient receives for a sent message
pub fn message_received(from: &str, text: &str) -> Value {
    json!({
        "type": "MESSAGE_SENT",
        "message": { "from": from, "text": text }
    })
}

/// Conversation announcement, identical in both directions
pub fn conversation_created(id: &str, participants: &[&str]) -> Value {
    json!({
        "type": "CONVERSATION_CREATED",
        "conversation": { "id": id, "participants": participants }
    })
}
