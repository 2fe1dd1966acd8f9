//! Async client runtime for self-describing HaveAPI services.
//!
//! Given only a URL, the client fetches the API description, exposes its
//! resources and actions as a navigable graph, validates input locally
//! against the declared parameters, authenticates through pluggable
//! providers, and turns replies into resource instances whose
//! associations are fetched on demand.
//!
//! ## Modules
//!
//! - [`client`] - [`Client`], its builder and description handling
//! - [`graph`] - [`Resource`] and [`Action`] handles
//! - [`auth`] - basic, token and OAuth2 providers and the [`AuthRegistry`]
//! - [`response`] / [`instance`] - action output and materialized objects
//! - [`action_state`] - waiting for blocking actions
//! - [`error`] - [`ApiError`] and its layers
//!
//! ## Example
//!
//! ```rust,ignore
//! use haveapi_client::{ActionStateWaiter, AuthOptions, Client, Params};
//!
//! let client = Client::new("https://api.example.com")?;
//! client.setup().await?;
//! client
//!     .authenticate_with("token", AuthOptions::credentials("admin", "secret"))
//!     .await?;
//!
//! let project = client.resource("project")?;
//! let created = project
//!     .call("create", Params::new().set("label", "docs"))
//!     .await?;
//! created.wait_for_completion(&ActionStateWaiter::new()).await?;
//!
//! let tasks = project
//!     .arg(created.into_instance()?.id().cloned().unwrap_or_default())
//!     .resource("task")?
//!     .call("index", Params::new())
//!     .await?
//!     .into_list()?;
//! ```

pub mod action_state;
pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod graph;
pub mod instance;
pub mod method;
mod request;
pub mod response;
pub mod url_template;

pub use action_state::{ActionState, ActionStateWaiter, WaitControl, WaitOutcome};
pub use auth::{
    AuthOptions, AuthProvider, AuthRegistry, AuthToken, AuthorizationRequest, BasicAuth, OAuth2Auth,
    PersistedAuth, TokenAuth, TokenLifetime,
};
pub use client::{AvailableVersions, Client, ClientBuilder, Compatibility, PROTOCOL_VERSION};
pub use config::ClientConfig;
pub use error::{ActionFailed, ApiError, AuthError, ConfigError, ProtocolError};
pub use graph::{Action, Node, Resource};
pub use instance::{Association, AssociationStub, ResourceInstance, ResourceInstanceList};
pub use response::{ActionResponse, Output};

pub use haveapi_schema::{InputValue, Params, ResourcePath, ResourceReference, SchemaError, ValidationError};
