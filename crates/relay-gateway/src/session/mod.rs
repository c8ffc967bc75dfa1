//! Client sessions
//!
//! Per-client lifecycle: broker topology, consumer registration, delivery and teardown.

mod error;
mod manager;
mod session;

pub use error::{SessionError, SessionResult};
pub use manager::{DeliveryOutcome, SessionManager};
pub use session::{Attach, Session, SessionState, Teardown};
