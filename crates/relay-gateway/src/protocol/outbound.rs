//! Frames queued for a client socket

use super::CloseCode;

/// Instruction for the socket writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized envelope sent as a text frame
    Frame(String),
    /// Send a close frame and stop writing
    Close(CloseCode),
}

impl Outbound {
    /// Check if this instruction ends the writer
    #[must_use]
    pub fn is_close(&self) -> bool {
        matches!(self, Self::Close(_))
    }
}
