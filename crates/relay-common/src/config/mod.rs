//! Configuration structs

mod app_config;

pub use app_config::{AppConfig, BrokerConfig, ConfigError, LogFormat, ServerConfig};
