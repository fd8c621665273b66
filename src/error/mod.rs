//! The unified error handling system for the gateway.

pub use types::{BackendErrorKind, GatewayError};

/// A unified `Result` type for the entire application.
///
/// All functions that can fail should return this type.
pub type Result<T> = std::result::Result<T, GatewayError>;

pub mod macros;
pub mod types;
