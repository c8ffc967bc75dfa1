//! Connection registry
//!
//! Maps client names to live connections using DashMap for thread-safe access.
//! The registry only routes; it never owns the socket or closes it.

use super::Connection;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Name already in use: {0}")]
    NameInUse(String),
}

/// Name to connection mapping
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped in Arc
    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Claim a name for a connection
    ///
    /// Check and insert happen under one shard lock, so two connections racing
    /// for the same name cannot both succeed.
    pub fn register(&self, connection: Arc<Connection>) -> Result<(), RegistryError> {
        match self.connections.entry(connection.name().to_string()) {
            Entry::Occupied(entry) => Err(RegistryError::NameInUse(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::debug!(name = %connection.name(), id = %connection.id(), "Connection registered");
                entry.insert(connection);
                Ok(())
            }
        }
    }

    /// Get the connection registered under a name
    pub fn lookup(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections.get(name).map(|r| r.clone())
    }

    /// Remove whatever connection holds a name
    pub fn remove(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections.remove(name).map(|(_, connection)| connection)
    }

    /// Remove a name only while it is still held by this exact connection
    pub fn release(&self, connection: &Connection) -> bool {
        let removed = self
            .connections
            .remove_if(connection.name(), |_, held| held.id() == connection.id())
            .is_some();

        if removed {
            tracing::debug!(name = %connection.name(), id = %connection.id(), "Connection released");
        }
        removed
    }

    /// Check if a name is held
    pub fn contains(&self, name: &str) -> bool {
        self.connections.contains_key(name)
    }

    /// Number of registered connections
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connection is registered
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connections.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .finish()
    }
}
