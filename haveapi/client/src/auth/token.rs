//! Token authentication with its request/renew/revoke sub-protocol.
//!
//! The provider walks a small state machine:
//!
//! ```text
//! Unconfigured -> Requesting -> Configured -> Expired -> Requesting -> ...
//!                      |  ^
//!                      v  |
//!             AwaitingMultiStep
//! ```
//!
//! A request answered with `complete: false` names a `next_action` on the
//! token resource; the caller's [`StepHandler`] supplies the input for it,
//! which is sent together with the intermediate token until the server
//! reports `complete: true`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use strum::Display;
use tracing::debug;

use haveapi_schema::{parse_datetime, ActionDescriptor, Params, ResourceDescriptor, TokenDescription};

use super::{AuthContext, AuthProvider, BoxFuture, PersistedAuth};
use crate::connection::OutgoingRequest;
use crate::error::{ApiError, AuthError, ProtocolError};
use crate::request::build_request;

const DEFAULT_HEADER: &str = "X-HaveAPI-Auth-Token";
const DEFAULT_QUERY_PARAMETER: &str = "_auth_token";

/// How long a requested token stays valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenLifetime {
    /// Valid for `interval` seconds, no renewal.
    Fixed,
    /// Valid for `interval` seconds, renewed with an explicit `renew`.
    RenewableManual,
    /// Validity is extended by `interval` with every request.
    #[default]
    RenewableAuto,
    /// Never expires.
    Permanent,
}

/// Where the token travels. Fixed when the provider is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTransport {
    #[default]
    Header,
    Query,
}

/// State of the token provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    Unconfigured,
    Requesting,
    /// The server asked for another step.
    AwaitingMultiStep { action: String },
    Configured,
    Expired,
}

/// An issued token.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, valid_to: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            valid_to,
        }
    }

    /// Returns `true` once `now` has reached `valid_to`. Tokens without an
    /// expiry never expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_some_and(|valid_to| now >= valid_to)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("valid_to", &self.valid_to)
            .finish()
    }
}

/// Supplies input for an additional authentication step.
///
/// Receives the step's action name and the names of the parameters it
/// declares (other than the intermediate token). Returning `None` aborts the
/// request with [`AuthError::StepDeclined`].
pub trait StepHandler: Send + Sync {
    fn step(&self, action: &str, fields: &[String]) -> Option<Params>;
}

impl<F> StepHandler for F
where
    F: Fn(&str, &[String]) -> Option<Params> + Send + Sync,
{
    fn step(&self, action: &str, fields: &[String]) -> Option<Params> {
        self(action, fields)
    }
}

/// Token authentication provider.
///
/// ## Examples
///
/// ```rust,ignore
/// use haveapi_client::auth::{TokenAuth, TokenLifetime};
/// use haveapi_client::Params;
///
/// let auth = TokenAuth::new("user", "pass")
///     .lifetime(TokenLifetime::RenewableAuto)
///     .interval(300)
///     .step_handler(|action: &str, _fields: &[String]| {
///         (action == "totp").then(|| Params::new().set("code", read_code()))
///     });
/// client.authenticate(auth).await?;
/// ```
pub struct TokenAuth {
    credentials: Option<(String, String)>,
    lifetime: TokenLifetime,
    interval: Option<u64>,
    scope: Option<String>,
    transport: TokenTransport,
    step_handler: Option<Arc<dyn StepHandler>>,
    header_name: String,
    query_name: String,
    state: TokenState,
    token: Option<AuthToken>,
}

impl TokenAuth {
    /// Creates a provider that requests a token with user credentials.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some((user.into(), password.into())),
            ..Self::empty()
        }
    }

    /// Creates a provider around a token issued earlier. Without credentials
    /// it cannot request a new one once this token expires.
    pub fn with_token(token: AuthToken) -> Self {
        Self {
            token: Some(token),
            ..Self::empty()
        }
    }

    pub(crate) fn empty() -> Self {
        Self {
            credentials: None,
            lifetime: TokenLifetime::default(),
            interval: None,
            scope: None,
            transport: TokenTransport::default(),
            step_handler: None,
            header_name: DEFAULT_HEADER.to_string(),
            query_name: DEFAULT_QUERY_PARAMETER.to_string(),
            state: TokenState::Unconfigured,
            token: None,
        }
    }

    pub fn lifetime(mut self, lifetime: TokenLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Token validity in seconds.
    pub fn interval(mut self, seconds: u64) -> Self {
        self.interval = Some(seconds);
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn transport(mut self, transport: TokenTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Sends the token as a query parameter instead of a header.
    pub fn via_query(self) -> Self {
        self.transport(TokenTransport::Query)
    }

    pub fn step_handler(mut self, handler: impl StepHandler + 'static) -> Self {
        self.step_handler = Some(Arc::new(handler));
        self
    }

    pub fn state(&self) -> &TokenState {
        &self.state
    }

    pub fn token(&self) -> Option<&AuthToken> {
        self.token.as_ref()
    }

    fn description<'c>(&self, ctx: &'c AuthContext) -> Result<&'c TokenDescription, AuthError> {
        ctx.version()
            .authentication
            .token
            .as_ref()
            .ok_or_else(|| AuthError::UnsupportedMethod {
                method: "token".to_string(),
            })
    }

    fn token_resource<'c>(&self, ctx: &'c AuthContext) -> Result<&'c ResourceDescriptor, ApiError> {
        self.description(ctx)?
            .token_resource()
            .ok_or_else(|| ApiError::not_found("token"))
    }

    async fn do_setup(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        let description = self.description(ctx)?;
        self.header_name = description.http_header.clone();
        self.query_name = description.query_parameter.clone();

        if self.token.is_some() {
            self.state = TokenState::Configured;
            return Ok(());
        }
        self.request_token(ctx).await
    }

    async fn request_token(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        let Some((user, password)) = self.credentials.clone() else {
            self.state = TokenState::Unconfigured;
            return Err(AuthError::MissingCredential {
                name: "user".to_string(),
            }
            .into());
        };

        self.state = TokenState::Requesting;
        let resource = self.token_resource(ctx)?;
        let request = resource
            .action("request")
            .ok_or_else(|| ApiError::not_found("token.request"))?;

        let mut params = Params::new()
            .set("user", user)
            .set("password", password)
            .set("lifetime", self.lifetime.to_string());
        if let Some(interval) = self.interval {
            params.insert("interval", interval);
        }
        if let Some(scope) = &self.scope {
            params.insert("scope", scope.as_str());
        }

        debug!(lifetime = %self.lifetime, "requesting auth token");
        let mut reply = match self.invoke(ctx, request, &params, false).await {
            Ok(output) => TokenReply::from_output(&output)?,
            Err(e) => {
                self.state = TokenState::Unconfigured;
                return Err(e);
            }
        };

        while !reply.complete {
            let Some(action_name) = reply.next_action.clone() else {
                self.state = TokenState::Unconfigured;
                return Err(ProtocolError::MalformedEnvelope(
                    "incomplete token reply without next_action".to_string(),
                )
                .into());
            };
            self.state = TokenState::AwaitingMultiStep {
                action: action_name.clone(),
            };
            debug!(action = %action_name, "token request needs another step");

            let action = resource
                .action(&action_name)
                .ok_or_else(|| ApiError::not_found(format!("token.{action_name}")))?;
            let fields: Vec<String> = action
                .input_parameters()
                .map(|(name, _)| name.clone())
                .filter(|name| name != "token")
                .collect();

            let supplied = self
                .step_handler
                .as_ref()
                .and_then(|handler| handler.step(&action_name, &fields));
            let Some(mut step_params) = supplied else {
                self.state = TokenState::Unconfigured;
                return Err(AuthError::StepDeclined {
                    action: action_name,
                }
                .into());
            };
            step_params.insert("token", reply.token.clone());

            self.state = TokenState::Requesting;
            reply = match self.invoke(ctx, action, &step_params, false).await {
                Ok(output) => TokenReply::from_output(&output)?,
                Err(e) => {
                    self.state = TokenState::Unconfigured;
                    return Err(e);
                }
            };
        }

        self.token = Some(AuthToken::new(reply.token, reply.valid_to));
        self.state = TokenState::Configured;
        debug!("auth token configured");
        Ok(())
    }

    /// Sends one token-resource action and returns its output object.
    async fn invoke(
        &self,
        ctx: &AuthContext,
        action: &ActionDescriptor,
        params: &Params,
        with_token: bool,
    ) -> Result<Map<String, Value>, ApiError> {
        let path = format!("token.{}", action.name);
        let mut request = build_request(ctx.version(), action, &path, &[], params, &Map::new())?;
        if with_token {
            request.apply_credentials(self.headers(), self.query_parameters())?;
        }

        let envelope = ctx.connection().send(request).await?.into_result()?;
        let output = match action.output.as_ref().map(|io| io.namespace.as_str()) {
            Some(namespace) if !namespace.is_empty() => envelope.response.get(namespace).cloned(),
            _ => Some(envelope.response),
        };
        Ok(match output {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        })
    }

    async fn do_authenticate(
        &mut self,
        ctx: &AuthContext,
        request: &mut OutgoingRequest,
    ) -> Result<(), ApiError> {
        let Some(token) = &self.token else {
            return Err(AuthError::NotConfigured {
                method: "token".to_string(),
            }
            .into());
        };

        if token.is_expired_at(Utc::now()) {
            self.state = TokenState::Expired;
            if self.credentials.is_none() {
                return Err(AuthError::TokenExpired.into());
            }
            debug!("auth token expired, requesting a new one");
            self.token = None;
            self.request_token(ctx).await?;
        }

        request.apply_credentials(self.headers(), self.query_parameters())?;
        Ok(())
    }

    async fn do_renew(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        if self.token.is_none() {
            return Err(AuthError::NotConfigured {
                method: "token".to_string(),
            }
            .into());
        }
        let resource = self.token_resource(ctx)?;
        let renew = resource
            .action("renew")
            .ok_or_else(|| ApiError::not_found("token.renew"))?;

        let output = self.invoke(ctx, renew, &Params::new(), true).await?;
        let valid_to = output
            .get("valid_to")
            .and_then(Value::as_str)
            .and_then(parse_datetime)
            .map(|dt| dt.with_timezone(&Utc));
        if let Some(token) = self.token.as_mut() {
            token.valid_to = valid_to;
        }
        self.state = TokenState::Configured;
        debug!(?valid_to, "auth token renewed");
        Ok(())
    }

    async fn do_logout(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        if self.token.is_none() {
            return Ok(());
        }
        let resource = self.token_resource(ctx)?;
        let revoke = resource
            .action("revoke")
            .ok_or_else(|| ApiError::not_found("token.revoke"))?;
        self.invoke(ctx, revoke, &Params::new(), true).await?;

        self.token = None;
        self.state = TokenState::Unconfigured;
        debug!("auth token revoked");
        Ok(())
    }
}

impl fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuth")
            .field("user", &self.credentials.as_ref().map(|(user, _)| user))
            .field("lifetime", &self.lifetime)
            .field("interval", &self.interval)
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl AuthProvider for TokenAuth {
    fn name(&self) -> &str {
        "token"
    }

    fn setup<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.do_setup(ctx))
    }

    fn authenticate<'a>(
        &'a mut self,
        ctx: &'a AuthContext,
        request: &'a mut OutgoingRequest,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.do_authenticate(ctx, request))
    }

    fn headers(&self) -> Vec<(String, String)> {
        match (&self.token, self.transport) {
            (Some(token), TokenTransport::Header) => {
                vec![(self.header_name.clone(), token.token.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn query_parameters(&self) -> Vec<(String, String)> {
        match (&self.token, self.transport) {
            (Some(token), TokenTransport::Query) => {
                vec![(self.query_name.clone(), token.token.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn renew<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.do_renew(ctx))
    }

    fn logout<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.do_logout(ctx))
    }

    fn persist(&self) -> Option<PersistedAuth> {
        let token = self.token.as_ref()?;
        Some(PersistedAuth {
            method: "token".to_string(),
            data: json!({
                "token": token.token,
                "valid_to": token.valid_to,
            }),
        })
    }

    /// Takes over the token only. The transport stays whatever this
    /// provider was built with.
    fn restore(&mut self, data: &Value) -> Result<(), ApiError> {
        let token: AuthToken = serde_json::from_value(data.clone())
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("persisted token: {e}")))?;
        self.token = Some(token);
        self.state = TokenState::Configured;
        Ok(())
    }
}

/// Output of the `request` action and of every additional step.
#[derive(Debug)]
struct TokenReply {
    token: String,
    valid_to: Option<DateTime<Utc>>,
    complete: bool,
    next_action: Option<String>,
}

impl TokenReply {
    fn from_output(output: &Map<String, Value>) -> Result<Self, ApiError> {
        let token = output
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| ProtocolError::MalformedEnvelope("token reply without token".to_string()))?;
        Ok(Self {
            token: token.to_string(),
            valid_to: output
                .get("valid_to")
                .and_then(Value::as_str)
                .and_then(parse_datetime)
                .map(|dt| dt.with_timezone(&Utc)),
            complete: output.get("complete").and_then(Value::as_bool).unwrap_or(true),
            next_action: output
                .get("next_action")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use chrono::Duration;
    use haveapi_schema::{RestMethod, VersionDescription};

    fn context() -> AuthContext {
        let version = VersionDescription::from_value(json!({
            "authentication": {"token": {"http_header": "X-Token", "query_parameter": "tok"}},
            "resources": {}
        }))
        .unwrap();
        let connection = Connection::new(
            reqwest::Client::new(),
            url::Url::parse("http://127.0.0.1:9").unwrap(),
        );
        AuthContext::new(connection, Arc::new(version))
    }

    #[test]
    fn test_reply_defaults_to_complete() {
        let output = json!({"token": "abc", "valid_to": "2030-01-01T00:00:00Z"});
        let reply = TokenReply::from_output(output.as_object().unwrap()).unwrap();
        assert!(reply.complete);
        assert_eq!(reply.token, "abc");
        assert!(reply.valid_to.is_some());
    }

    #[test]
    fn test_reply_without_token_is_malformed() {
        let output = json!({"complete": true});
        assert!(TokenReply::from_output(output.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        assert!(AuthToken::new("t", Some(now)).is_expired_at(now));
        assert!(!AuthToken::new("t", Some(now + Duration::seconds(60))).is_expired_at(now));
        assert!(!AuthToken::new("t", None).is_expired_at(now));
    }

    #[tokio::test]
    async fn test_setup_with_token_uses_described_names() {
        let ctx = context();
        let mut auth = TokenAuth::with_token(AuthToken::new("abc", None));
        auth.setup(&ctx).await.unwrap();
        assert_eq!(auth.state(), &TokenState::Configured);
        assert_eq!(auth.headers(), [("X-Token".to_string(), "abc".to_string())]);

        let mut auth = TokenAuth::with_token(AuthToken::new("abc", None)).via_query();
        auth.setup(&ctx).await.unwrap();
        assert!(auth.headers().is_empty());
        assert_eq!(auth.query_parameters(), [("tok".to_string(), "abc".to_string())]);
    }

    #[tokio::test]
    async fn test_expired_without_credentials() {
        let ctx = context();
        let expired = AuthToken::new("abc", Some(Utc::now() - Duration::seconds(1)));
        let mut auth = TokenAuth::with_token(expired);
        auth.setup(&ctx).await.unwrap();

        let mut request = OutgoingRequest::new(RestMethod::Get, "/v1/projects");
        let err = auth.authenticate(&ctx, &mut request).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth(AuthError::TokenExpired)));
        assert_eq!(auth.state(), &TokenState::Expired);
        assert!(request.header_value("X-Token").is_none());
    }

    #[tokio::test]
    async fn test_setup_without_token_support() {
        let version = VersionDescription::from_value(json!({"resources": {}})).unwrap();
        let connection = Connection::new(
            reqwest::Client::new(),
            url::Url::parse("http://127.0.0.1:9").unwrap(),
        );
        let ctx = AuthContext::new(connection, Arc::new(version));
        let err = TokenAuth::new("user", "pass").setup(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Auth(AuthError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_persist_and_restore() {
        let valid_to = Utc::now() + Duration::hours(1);
        let auth = TokenAuth::with_token(AuthToken::new("abc", Some(valid_to))).via_query();
        let persisted = auth.persist().unwrap();
        assert_eq!(persisted.method, "token");

        let mut restored = TokenAuth::empty().via_query();
        restored.restore(&persisted.data).unwrap();
        assert_eq!(restored.token().unwrap().token, "abc");
        assert_eq!(restored.query_parameters()[0].1, "abc");
        assert_eq!(restored.state(), &TokenState::Configured);
    }

    #[test]
    fn test_restore_keeps_configured_transport() {
        let mut restored = TokenAuth::empty();
        restored
            .restore(&json!({"token": "abc", "valid_to": null, "transport": "query"}))
            .unwrap();
        assert!(restored.query_parameters().is_empty());
        assert_eq!(
            restored.headers(),
            [("X-HaveAPI-Auth-Token".to_string(), "abc".to_string())]
        );
    }

    #[test]
    fn test_debug_redacts_token() {
        let auth = TokenAuth::with_token(AuthToken::new("very-secret", None));
        assert!(!format!("{auth:?}").contains("very-secret"));
    }
}
