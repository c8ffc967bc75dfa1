//! Gateway state
//!
//! Application state shared by every request handler.

use crate::connection::ConnectionRegistry;
use crate::session::SessionManager;
use relay_common::AppConfig;
use relay_core::BrokerChannel;
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    /// Session lifecycle and message routing
    sessions: Arc<SessionManager>,
    /// Name to connection mapping, shared with the session manager
    registry: Arc<ConnectionRegistry>,
    /// Shared broker channel
    broker: Arc<dyn BrokerChannel>,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl GatewayState {
    /// Create a new gateway state over a broker channel
    pub fn new(broker: Arc<dyn BrokerChannel>, config: AppConfig) -> Self {
        let registry = ConnectionRegistry::new_shared();
        let sessions = Arc::new(SessionManager::new(
            broker.clone(),
            registry.clone(),
            config.broker.exchange.clone(),
        ));

        Self {
            sessions,
            registry,
            broker,
            config: Arc::new(config),
        }
    }

    /// Get the session manager
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Get the connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Get the shared broker channel
    pub fn broker(&self) -> &Arc<dyn BrokerChannel> {
        &self.broker
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("sessions", &self.sessions)
            .field("config", &"AppConfig")
            .finish()
    }
}
