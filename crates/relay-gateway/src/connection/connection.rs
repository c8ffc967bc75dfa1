//! Individual WebSocket connection
//!
//! The routing handle for one client: its name and the queue feeding its socket writer.

use crate::protocol::{CloseCode, Outbound};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A single WebSocket connection
pub struct Connection {
    /// Client name from the upgrade request
    name: String,

    /// Distinguishes connections that used the same name over time
    id: Uuid,

    /// Channel to the socket writer task
    sender: mpsc::UnboundedSender<Outbound>,

    /// Connection creation time
    created_at: Instant,
}

impl Connection {
    /// Create a new connection
    pub fn new(name: impl Into<String>, sender: mpsc::UnboundedSender<Outbound>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            id: Uuid::new_v4(),
            sender,
            created_at: Instant::now(),
        })
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the connection ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get connection age
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queue a text frame for the client
    ///
    /// Returns `false` if the writer is gone.
    pub fn send_text(&self, frame: String) -> bool {
        if self.sender.send(Outbound::Frame(frame)).is_err() {
            tracing::debug!(name = %self.name, "Failed to queue frame, writer closed");
            return false;
        }
        true
    }

    /// Ask the writer to close the socket with a close code
    pub fn close(&self, code: CloseCode) -> bool {
        tracing::debug!(name = %self.name, close_code = %code, "Closing connection");
        self.sender.send(Outbound::Close(code)).is_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("age", &self.age())
            .finish()
    }
}
