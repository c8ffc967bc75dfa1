//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    /// Verbose logging
    pub debug: bool,
    pub log_format: LogFormat,
}

/// WebSocket listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Message broker configuration
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// Name of the shared topic exchange
    pub exchange: String,
}

impl BrokerConfig {
    /// AMQP URI for the broker
    #[must_use]
    pub fn url(&self) -> String {
        format!("amqp://{}:{}", self.host, self.port)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    80
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    5672
}

fn default_exchange() -> String {
    "messages".to_string()
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is set to a value that cannot be used
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Unset or blank variables fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let exchange = match lookup("MESSAGES_EXCHANGE_NAME") {
            None => default_exchange(),
            Some(name) if name.trim().is_empty() => {
                return Err(ConfigError::InvalidValue("MESSAGES_EXCHANGE_NAME", name));
            }
            Some(name) => name,
        };

        Ok(Self {
            server: ServerConfig {
                host: var("MESSAGES_WEBSOCKET_SERVICE_HOST").unwrap_or_else(default_host),
                port: parse_port(
                    "MESSAGES_WEBSOCKET_SERVICE_PORT",
                    var("MESSAGES_WEBSOCKET_SERVICE_PORT"),
                    default_port(),
                )?,
            },
            broker: BrokerConfig {
                host: var("MESSAGES_RABBIT_SERVICE_HOST").unwrap_or_else(default_broker_host),
                port: parse_port(
                    "MESSAGES_RABBIT_SERVICE_PORT",
                    var("MESSAGES_RABBIT_SERVICE_PORT"),
                    default_broker_port(),
                )?,
                exchange,
            },
            debug: parse_flag(var("DEBUG").as_deref()),
            log_format: match var("LOG_FORMAT") {
                None => LogFormat::default(),
                Some(s) => match s.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" | "text" => LogFormat::Pretty,
                    _ => return Err(ConfigError::InvalidValue("LOG_FORMAT", s)),
                },
            },
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
            },
            broker: BrokerConfig {
                host: default_broker_host(),
                port: default_broker_port(),
                exchange: default_exchange(),
            },
            debug: false,
            log_format: LogFormat::default(),
        }
    }
}

fn parse_port(key: &'static str, value: Option<String>, default: u16) -> Result<u16, ConfigError> {
    match value {
        None => Ok(default),
        Some(s) => s.trim().parse().map_err(|_| ConfigError::InvalidValue(key, s)),
    }
}

/// `0`, `false`, `no` and `off` turn a flag off; any other value turns it on
fn parse_flag(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(s) => !matches!(s.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
