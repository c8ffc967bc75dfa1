//! Domain errors - error types for the domain layer

mod broker_error;
mod translate_error;

pub use broker_error::BrokerError;
pub use translate_error::TranslateError;
