//! Error types for description loading and input validation.
//!
//! - [`SchemaError`] - the description document is malformed
//! - [`ValidationError`] - caller input failed coercion or a validator

mod schema_error;
mod validation_error;

pub use schema_error::SchemaError;
pub use validation_error::ValidationError;
