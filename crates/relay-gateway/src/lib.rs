//! # relay-gateway
//!
//! WebSocket gateway that binds each named client to its own broker queue.

pub mod connection;
pub mod protocol;
pub mod server;
pub mod session;

pub use server::{create_app, create_gateway_state, run, GatewayState};
