//! Layered error types for the client runtime.
//!
//! The error hierarchy is structured for actionable diagnostics:
//! - [`ApiError`] - Top-level error type for every client operation
//! - [`ProtocolError`] - transport, HTTP status and envelope failures
//! - [`AuthError`] - authentication setup and credential rejection
//! - [`ActionFailed`] - the server refused an action (`status: false`)
//! - [`ConfigError`] - client configuration problems
//!
//! Input validation failures reuse [`haveapi_schema::ValidationError`].

mod action_failed;
mod api_error;
mod auth_error;
mod config_error;
mod protocol_error;

pub use action_failed::ActionFailed;
pub use api_error::ApiError;
pub use auth_error::AuthError;
pub use config_error::ConfigError;
pub use haveapi_schema::{SchemaError, ValidationError};
pub use protocol_error::ProtocolError;
