//! WebSocket close codes
//!
//! Relay-specific close codes in the 4000 range.

/// Relay WebSocket close codes
///
/// Sent in the close frame when the relay ends a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    /// Unknown error occurred
    UnknownError = 4000,
    /// Another live connection already holds the requested name
    NameInUse = 4001,
    /// Broker topology or consumer setup failed
    SetupFailed = 4002,
    /// The broker stopped delivering to this connection
    BrokerUnavailable = 4003,
}

impl CloseCode {
    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "Unknown error occurred",
            Self::NameInUse => "Name already in use",
            Self::SetupFailed => "Session setup failed",
            Self::BrokerUnavailable => "Broker unavailable",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::UnknownError => "UnknownError",
            Self::NameInUse => "NameInUse",
            Self::SetupFailed => "SetupFailed",
            Self::BrokerUnavailable => "BrokerUnavailable",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
