//! Pluggable authentication providers.
//!
//! A provider is set up once against the API description, then decorates
//! every outgoing request. Providers are trait objects so callers can plug
//! in their own; the built-in ones are [`BasicAuth`], [`TokenAuth`] and
//! [`OAuth2Auth`], and [`AuthRegistry`] maps method names to them.

mod basic;
mod oauth2;
mod registry;
mod token;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use haveapi_schema::VersionDescription;

use crate::connection::{Connection, OutgoingRequest};
use crate::error::ApiError;

pub use basic::BasicAuth;
pub use oauth2::{AuthorizationRequest, OAuth2Auth};
pub use registry::{AuthFactory, AuthOptions, AuthRegistry};
pub use token::{AuthToken, StepHandler, TokenAuth, TokenLifetime, TokenState, TokenTransport};

/// Boxed future returned by [`AuthProvider`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a provider needs to talk to the API on its own behalf, for example
/// to request or revoke a token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    connection: Connection,
    version: Arc<VersionDescription>,
}

impl AuthContext {
    pub fn new(connection: Connection, version: Arc<VersionDescription>) -> Self {
        Self {
            connection,
            version,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The API version the provider was set up against.
    pub fn version(&self) -> &VersionDescription {
        &self.version
    }
}

/// Serializable provider state, enough to resume a session later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAuth {
    /// Registry name of the provider.
    pub method: String,
    pub data: Value,
}

/// An authentication method.
///
/// `setup` runs once when the provider is attached to a client. After that
/// `authenticate` is called for every request; the default implementation
/// applies [`headers`](Self::headers) and
/// [`query_parameters`](Self::query_parameters). Providers whose credentials
/// expire override it to refresh first.
pub trait AuthProvider: fmt::Debug + Send + Sync {
    /// Registry name, such as `"token"`.
    fn name(&self) -> &str;

    /// Prepares the provider, possibly talking to the API.
    fn setup<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>>;

    /// Decorates an outgoing request with credentials.
    fn authenticate<'a>(
        &'a mut self,
        _ctx: &'a AuthContext,
        request: &'a mut OutgoingRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            request.apply_credentials(self.headers(), self.query_parameters())?;
            Ok::<_, ApiError>(())
        })
    }

    /// Headers to send with every request.
    fn headers(&self) -> Vec<(String, String)>;

    /// Query parameters to send with every request.
    fn query_parameters(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Extends the lifetime of the current credentials. Providers without
    /// renewable credentials do nothing.
    fn renew<'a>(&'a mut self, _ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async { Ok::<_, ApiError>(()) })
    }

    /// Ends the session, revoking server-side state where there is any.
    fn logout<'a>(&'a mut self, _ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async { Ok::<_, ApiError>(()) })
    }

    /// Exports state that [`restore`](Self::restore) can resume from.
    /// Providers holding nothing worth saving return `None`.
    fn persist(&self) -> Option<PersistedAuth> {
        None
    }

    /// Resumes from persisted data, replacing current state.
    fn restore(&mut self, data: &Value) -> Result<(), ApiError>;
}
