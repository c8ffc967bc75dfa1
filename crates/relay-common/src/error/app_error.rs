//! Application error types
//!
//! Errors that end the process. Session-level failures never reach this type.

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Broker unavailable: {0}")]
    Broker(String),

    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 78,
            Self::Broker(_) | Self::Bind { .. } | Self::Internal(_) => 1,
        }
    }

    /// Get error code for log fields
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Broker(_) => "BROKER_UNAVAILABLE",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a broker error from any displayable cause
    pub fn broker(err: impl std::fmt::Display) -> Self {
        Self::Broker(err.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
