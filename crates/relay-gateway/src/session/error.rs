//! Session error types

use crate::connection::RegistryError;
use crate::protocol::CloseCode;
use relay_core::BrokerError;
use thiserror::Error;

/// Errors that end a session before it starts consuming
#[derive(Debug, Error)]
pub enum SessionError {
    /// Another live connection holds the name
    #[error("Name already in use: {0}")]
    NameInUse(String),

    /// Exchange, queue or binding could not be asserted
    #[error("Topology setup failed: {0}")]
    Topology(#[source] BrokerError),

    /// Consumer could not be registered
    #[error("Consumer registration failed: {0}")]
    Consume(#[source] BrokerError),

    /// A consumer tag was already attached to the session
    #[error("Consumer already attached")]
    AlreadyAttached,
}

impl SessionError {
    /// Convert to the close code sent to the client
    pub fn to_close_code(&self) -> CloseCode {
        match self {
            Self::NameInUse(_) => CloseCode::NameInUse,
            Self::Topology(_) | Self::Consume(_) => CloseCode::SetupFailed,
            Self::AlreadyAttached => CloseCode::UnknownError,
        }
    }
}

impl From<RegistryError> for SessionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NameInUse(name) => Self::NameInUse(name),
        }
    }
}

/// Session result type
pub type SessionResult<T> = Result<T, SessionError>;
