//! Gateway protocol definitions
//!
//! Close codes and the frames queued for a socket writer.

mod close_codes;
mod outbound;

pub use close_codes::CloseCode;
pub use outbound::Outbound;
