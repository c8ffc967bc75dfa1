//! Integration test utilities for the relay
//!
//! Runs the gateway on an ephemeral port over the in-process broker and
//! drives it with real WebSocket clients.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
