//! Description model for self-describing HaveAPI services.
//!
//! A HaveAPI server publishes its resources, actions, parameters and
//! authentication methods as a JSON document. This crate parses that
//! document into an immutable [`SchemaDescription`] and prepares caller
//! input against it, all without doing any I/O.
//!
//! ## Modules
//!
//! - [`description`] - parsed version documents and their resource tree
//! - [`coerce`] - conversion of loose input to declared parameter types
//! - [`validator`] - the validator chain declared per parameter
//! - [`input`] - presence, nullability, coercion and validation of a call
//! - [`error`] - [`SchemaError`] and [`ValidationError`]
//!
//! ## Example
//!
//! ```
//! use haveapi_schema::{prepare_input, Params, VersionDescription};
//! use serde_json::json;
//!
//! let version = VersionDescription::from_value(json!({
//!     "resources": {
//!         "project": {
//!             "actions": {
//!                 "create": {
//!                     "method": "POST",
//!                     "url": "/v1/projects",
//!                     "input": {
//!                         "layout": "object",
//!                         "namespace": "project",
//!                         "parameters": {"priority": {"type": "Integer", "required": true}}
//!                     }
//!                 }
//!             }
//!         }
//!     }
//! }))?;
//!
//! let create = version.action_at(&"project".into(), "create").unwrap();
//! let input = prepare_input(create.input.as_ref().unwrap(), &Params::new().set("priority", "3"))?;
//! assert_eq!(input["priority"], json!(3));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod coerce;
pub mod description;
pub mod error;
pub mod input;
pub mod method;
pub mod path;
pub mod validator;

pub use coerce::{coerce, format_datetime, parse_datetime, InputValue, ResourceReference};
pub use description::{
    ActionDescriptor, AssociationTarget, AuthMethods, BasicDescription, IoSpec, Layout, NodeRef,
    OAuth2Description, ParameterDescriptor, ParameterType, ResourceDescriptor, SchemaDescription,
    TokenDescription, VersionDescription,
};
pub use error::{SchemaError, ValidationError};
pub use input::{prepare_input, Params};
pub use method::RestMethod;
pub use path::ResourcePath;
pub use validator::{Validator, Validators};
