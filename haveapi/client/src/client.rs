//! The client entry point.
//!
//! A [`Client`] starts out knowing only a URL. [`Client::setup`] fetches the
//! description once; after that the resource graph, authentication and
//! action calls all work off an immutable snapshot of it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use haveapi_schema::description::version_key;
use haveapi_schema::{ResourcePath, SchemaDescription, VersionDescription};

use crate::action_state::ActionState;
use crate::auth::{AuthContext, AuthOptions, AuthProvider, AuthRegistry, PersistedAuth};
use crate::config::ClientConfig;
use crate::connection::{Connection, OutgoingRequest};
use crate::envelope::Envelope;
use crate::error::{ApiError, AuthError, ConfigError, ProtocolError};
use crate::graph::{Node, Resource};

/// Default request timeout in seconds.
pub(crate) const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Protocol version this client implements.
pub const PROTOCOL_VERSION: &str = "2.0";

/// How well the server's protocol version matches [`PROTOCOL_VERSION`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same major and minor version.
    Compatible,
    /// Same major version, different minor version.
    Imperfect,
    /// Different major version, or the server did not say.
    Incompatible,
}

impl Compatibility {
    /// Compares a server's protocol version with ours.
    pub fn of(server: Option<&str>) -> Self {
        fn major_minor(version: &str) -> Option<(&str, &str)> {
            let mut parts = version.split('.');
            Some((parts.next()?, parts.next().unwrap_or("0")))
        }

        let (Some((major, minor)), Some((our_major, our_minor))) =
            (server.and_then(major_minor), major_minor(PROTOCOL_VERSION))
        else {
            return Self::Incompatible;
        };
        match (major == our_major, minor == our_minor) {
            (true, true) => Self::Compatible,
            (true, false) => Self::Imperfect,
            _ => Self::Incompatible,
        }
    }
}

/// Versions a server offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableVersions {
    pub versions: Vec<String>,
    pub default: String,
}

#[derive(Deserialize)]
struct RawVersions {
    versions: Vec<Value>,
    default: Value,
}

/// The description currently in use.
#[derive(Debug, Clone)]
struct Snapshot {
    schema: Arc<SchemaDescription>,
    version: String,
    description: Arc<VersionDescription>,
    protocol_version: Option<String>,
}

/// Builder for configuring a [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    base_url: String,
    version: Option<String>,
    timeout: Duration,
    default_headers: HeaderMap,
    registry: AuthRegistry,
}

impl ClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            version: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            default_headers: HeaderMap::new(),
            registry: AuthRegistry::with_defaults(),
        }
    }

    /// Pins an API version instead of using the server's default.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a default header to all requests.
    ///
    /// ## Examples
    ///
    /// ```rust,ignore
    /// let client = Client::builder("https://api.example.com")
    ///     .default_header("Accept-Language", "en")?
    ///     .build()?;
    /// ```
    ///
    /// ## Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, ApiError> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("invalid header name: {e}")))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| ConfigError::InvalidHeader(format!("invalid header value: {e}")))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    pub fn user_agent(self, user_agent: impl AsRef<str>) -> Result<Self, ApiError> {
        self.default_header(USER_AGENT.as_str(), user_agent)
    }

    /// Replaces the authentication registry, e.g. to add custom methods.
    pub fn registry(mut self, registry: AuthRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Builds the [`Client`].
    ///
    /// ## Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be constructed.
    pub fn build(self) -> Result<Client, ApiError> {
        let base_url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl {
                url: self.base_url,
                reason: "not a base URL".to_string(),
            }
            .into());
        }

        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .default_headers(self.default_headers)
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ConfigError::Http)?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                connection: Connection::new(http, base_url),
                version: self.version,
                registry: self.registry,
                snapshot: RwLock::new(None),
                auth: tokio::sync::Mutex::new(None),
            }),
        })
    }
}

struct ClientInner {
    connection: Connection,
    version: Option<String>,
    registry: AuthRegistry,
    snapshot: RwLock<Option<Snapshot>>,
    auth: tokio::sync::Mutex<Option<Box<dyn AuthProvider>>>,
}

/// Client for one HaveAPI service.
///
/// Cheap to clone; clones share the description, the connection pool and
/// the authentication session.
///
/// ## Examples
///
/// ```rust,ignore
/// use haveapi_client::{Client, Params};
///
/// let client = Client::new("https://api.example.com")?;
/// client.setup().await?;
/// client.authenticate_with("token", AuthOptions::credentials("user", "secret")).await?;
///
/// let projects = client
///     .resolve("project.index")?
///     .into_action()?
///     .call(Params::new().set("limit", 10))
///     .await?
///     .into_list()?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    /// Creates a client with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::builder(base_url).build()
    }

    /// Creates a client from a [`ClientConfig`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        config.builder()?.build()
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub fn registry(&self) -> &AuthRegistry {
        &self.inner.registry
    }

    /// Fetches the description.
    ///
    /// Sends one unauthenticated `OPTIONS` request: `/` without a pinned
    /// version, `/v{version}/` with one. Running it again replaces the
    /// description atomically.
    ///
    /// ## Errors
    ///
    /// Every failure is reported as [`ApiError::Protocol`].
    pub async fn setup(&self) -> Result<(), ApiError> {
        let path = match &self.inner.version {
            Some(version) => format!("/v{version}/"),
            None => "/".to_string(),
        };
        debug!(path = %path, "fetching API description");
        let envelope = self.inner.connection.describe(&path, &[]).await?;
        let protocol_version = envelope.version.clone();

        let schema = match &self.inner.version {
            Some(version) => SchemaDescription::from_version_document(version.clone(), envelope.response),
            None => SchemaDescription::from_root_document(envelope.response),
        }
        .map_err(ProtocolError::Description)?;

        self.install(schema, protocol_version);
        Ok(())
    }

    /// Installs a description obtained elsewhere, e.g. from a cache.
    pub fn install_description(&self, version: impl Into<String>, description: VersionDescription) {
        self.install(SchemaDescription::single(version, description), None);
    }

    fn install(&self, schema: SchemaDescription, protocol_version: Option<String>) {
        let version = schema.default_version().to_string();
        let description = schema.default_description();
        info!(
            version = %version,
            resources = description.resources().len(),
            "API description installed"
        );
        *self.inner.snapshot.write() = Some(Snapshot {
            schema: Arc::new(schema),
            version,
            description,
            protocol_version,
        });
    }

    fn snapshot(&self) -> Result<Snapshot, ApiError> {
        self.inner
            .snapshot
            .read()
            .clone()
            .ok_or_else(|| ProtocolError::NotSetUp.into())
    }

    /// The description of the version in use.
    ///
    /// ## Errors
    ///
    /// Returns [`ProtocolError::NotSetUp`] before [`setup`](Self::setup).
    pub fn description(&self) -> Result<Arc<VersionDescription>, ApiError> {
        Ok(self.snapshot()?.description)
    }

    /// Every version the fetched document described.
    pub fn schema(&self) -> Result<Arc<SchemaDescription>, ApiError> {
        Ok(self.snapshot()?.schema)
    }

    /// Name of the version in use.
    pub fn api_version(&self) -> Result<String, ApiError> {
        Ok(self.snapshot()?.version)
    }

    /// Lists the versions the server offers without fetching them.
    pub async fn available_versions(&self) -> Result<AvailableVersions, ApiError> {
        let envelope = self
            .inner
            .connection
            .describe("/", &[("describe", "versions")])
            .await?;
        let raw: RawVersions = serde_json::from_value(envelope.response)
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("version list: {e}")))?;
        Ok(AvailableVersions {
            versions: raw.versions.iter().map(version_key).collect(),
            default: version_key(&raw.default),
        })
    }

    /// Compares the server's protocol version with [`PROTOCOL_VERSION`].
    pub fn compatibility(&self) -> Result<Compatibility, ApiError> {
        Ok(Compatibility::of(self.snapshot()?.protocol_version.as_deref()))
    }

    /// A top-level resource.
    pub fn resource(&self, name: &str) -> Result<Resource, ApiError> {
        self.root()?.resource(name)
    }

    /// Names of the top-level resources.
    pub fn resource_names(&self) -> Result<Vec<String>, ApiError> {
        Ok(self.description()?.resources().keys().cloned().collect())
    }

    /// Resolves a dotted path such as `"project.task.index"`.
    pub fn resolve(&self, path: &str) -> Result<Node, ApiError> {
        let mut segments = path.split('.').filter(|s| !s.is_empty());
        let first = segments.next().ok_or_else(|| ApiError::not_found(path))?;
        let mut node = self.root()?.resolve(first)?;
        for segment in segments {
            node = match node {
                Node::Resource(resource) => resource.resolve(segment)?,
                Node::Action(action) => {
                    return Err(ApiError::not_found(format!("{}.{segment}", action.path())))
                }
            };
        }
        Ok(node)
    }

    fn root(&self) -> Result<Resource, ApiError> {
        Ok(Resource::new(
            self.clone(),
            self.description()?,
            ResourcePath::root(),
            Vec::new(),
        ))
    }

    /// Attaches an authentication provider and sets it up.
    ///
    /// ## Errors
    ///
    /// Returns [`AuthError::UnsupportedMethod`] when the version does not
    /// declare the provider's method, or whatever the provider's setup
    /// reports.
    pub async fn authenticate(&self, provider: impl AuthProvider + 'static) -> Result<(), ApiError> {
        self.authenticate_boxed(Box::new(provider)).await
    }

    /// Builds a provider through the registry and attaches it.
    pub async fn authenticate_with(&self, method: &str, options: AuthOptions) -> Result<(), ApiError> {
        let provider = self.inner.registry.create(method, options)?;
        self.authenticate_boxed(provider).await
    }

    pub async fn authenticate_boxed(&self, mut provider: Box<dyn AuthProvider>) -> Result<(), ApiError> {
        let ctx = self.auth_context()?;
        let method = provider.name().to_string();
        if !ctx.version().supports_auth(&method) {
            return Err(AuthError::UnsupportedMethod { method }.into());
        }

        let mut slot = self.inner.auth.lock().await;
        provider.setup(&ctx).await?;
        debug!(method = %method, "authentication provider attached");
        *slot = Some(provider);
        Ok(())
    }

    /// Resumes a persisted session.
    pub async fn restore_auth(&self, persisted: &PersistedAuth) -> Result<(), ApiError> {
        let provider = self.inner.registry.restore(persisted)?;
        self.authenticate_boxed(provider).await
    }

    /// Resumes a persisted session with a provider built from `options`.
    pub async fn restore_auth_with(
        &self,
        persisted: &PersistedAuth,
        options: AuthOptions,
    ) -> Result<(), ApiError> {
        let provider = self.inner.registry.restore_with(persisted, options)?;
        self.authenticate_boxed(provider).await
    }

    /// State of the current session, if the provider has any worth saving.
    pub async fn persist_auth(&self) -> Option<PersistedAuth> {
        self.inner.auth.lock().await.as_ref()?.persist()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.auth.lock().await.is_some()
    }

    /// Extends the current credentials.
    pub async fn renew_auth(&self) -> Result<(), ApiError> {
        let ctx = self.auth_context()?;
        let mut slot = self.inner.auth.lock().await;
        let provider = slot.as_mut().ok_or_else(not_authenticated)?;
        provider.renew(&ctx).await
    }

    /// Ends the session and detaches the provider.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let ctx = self.auth_context()?;
        let mut slot = self.inner.auth.lock().await;
        let Some(mut provider) = slot.take() else {
            return Ok(());
        };
        if let Err(e) = provider.logout(&ctx).await {
            *slot = Some(provider);
            return Err(e);
        }
        debug!(method = provider.name(), "logged out");
        Ok(())
    }

    /// Pending and recently finished action states of the current user.
    pub async fn action_states(&self) -> Result<Vec<ActionState>, ApiError> {
        let response = self
            .resource("action_state")?
            .action("index")?
            .call(haveapi_schema::Params::new())
            .await?;
        ActionState::list_from(&response)
    }

    fn auth_context(&self) -> Result<AuthContext, ApiError> {
        Ok(AuthContext::new(
            self.inner.connection.clone(),
            self.description()?,
        ))
    }

    /// Decorates a request with the current credentials, sends it and
    /// converts a refused action into [`ApiError::ActionFailed`].
    pub(crate) async fn execute(
        &self,
        version: &Arc<VersionDescription>,
        mut request: OutgoingRequest,
    ) -> Result<Envelope, ApiError> {
        {
            let mut slot = self.inner.auth.lock().await;
            if let Some(provider) = slot.as_mut() {
                let ctx = AuthContext::new(self.inner.connection.clone(), Arc::clone(version));
                provider.authenticate(&ctx, &mut request).await?;
            }
        }
        Ok(self.inner.connection.send(request).await?.into_result()?)
    }
}

fn not_authenticated() -> ApiError {
    AuthError::NotConfigured {
        method: "none".to_string(),
    }
    .into()
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.connection.base_url().as_str())
            .field("version", &self.inner.version)
            .finish_non_exhaustive()
    }
}
