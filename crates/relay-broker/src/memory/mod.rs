//! In-process topic broker
//!
//! Implements the broker port without a network: exchanges, auto-delete
//! queues, bindings with topic patterns, and consumers all live in one
//! mutex-guarded table.

mod broker;
mod topic;

pub use broker::{BrokerOp, MemoryBroker, PublishedMessage};
pub use topic::topic_matches;
