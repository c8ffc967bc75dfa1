//! Connection management
//!
//! Live client connections and the name registry used for routing.

mod connection;
mod registry;

pub use connection::Connection;
pub use registry::{ConnectionRegistry, RegistryError};
