//! OAuth2 authorization-code flow.
//!
//! Two separate objects: [`AuthorizationRequest`] runs the authorization
//! step (PKCE verifier and challenge, state nonce, code exchange) and
//! yields an [`OAuth2Auth`], which only sends the bearer token and keeps it
//! fresh.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use haveapi_schema::OAuth2Description;

use super::{AuthContext, AuthProvider, BoxFuture, PersistedAuth};
use crate::connection::{Connection, OutgoingRequest};
use crate::error::{ApiError, AuthError, ProtocolError};

const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// One authorization attempt: build the authorize URL, send the user there,
/// then hand the callback URL back to [`validate_callback`] and
/// [`exchange`].
///
/// [`validate_callback`]: Self::validate_callback
/// [`exchange`]: Self::exchange
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    client_id: String,
    redirect_uri: String,
    scope: Option<String>,
    authorize_url: Url,
    token_url: Url,
    state: String,
    verifier: String,
}

impl AuthorizationRequest {
    /// Starts an authorization against the endpoints a version declares,
    /// resolved against the connection's base URL.
    pub fn new(
        connection: &Connection,
        description: &OAuth2Description,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut rng = rand::thread_rng();
        let verifier = (0..VERIFIER_LEN)
            .map(|_| char::from(VERIFIER_CHARSET[rng.gen_range(0..VERIFIER_CHARSET.len())]))
            .collect();
        let state = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(STATE_LEN)
            .map(char::from)
            .collect();

        Ok(Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: None,
            authorize_url: connection.url(&description.authorize_url)?,
            token_url: connection.url(&description.token_url)?,
            state,
            verifier,
        })
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// The state nonce the callback must echo.
    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge derived from the verifier.
    pub fn code_challenge(&self) -> String {
        code_challenge(&self.verifier)
    }

    /// URL to send the user to.
    pub fn authorize_url(&self) -> Url {
        let mut url = self.authorize_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", &self.state)
                .append_pair("code_challenge", &self.code_challenge())
                .append_pair("code_challenge_method", "S256");
            if let Some(scope) = &self.scope {
                query.append_pair("scope", scope);
            }
        }
        url
    }

    /// Checks the redirect the authorization server sent back and returns
    /// the authorization code.
    pub fn validate_callback(&self, callback: &str) -> Result<String, AuthError> {
        let url = Url::parse(callback)
            .map_err(|e| AuthError::InvalidFormat(format!("callback URL: {e}")))?;
        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "error" => {
                    return Err(AuthError::AuthorizationDenied {
                        error: value.into_owned(),
                    })
                }
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        if state.as_deref() != Some(self.state.as_str()) {
            return Err(AuthError::StateMismatch);
        }
        code.ok_or_else(|| AuthError::MissingCredential {
            name: "code".to_string(),
        })
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange(&self, connection: &Connection, code: &str) -> Result<OAuth2Auth, ApiError> {
        let reply = connection
            .post_form(
                self.token_url.as_str(),
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", &self.redirect_uri),
                    ("client_id", &self.client_id),
                    ("code_verifier", &self.verifier),
                ],
            )
            .await?;
        let tokens = TokenResponse::parse(reply)?;
        let expires_at = tokens.expires_at();
        debug!("oauth2 authorization code exchanged");

        Ok(OAuth2Auth {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_at,
            client_id: Some(self.client_id.clone()),
            token_url: Some(self.token_url.to_string()),
            revoke_url: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn parse(reply: Value) -> Result<Self, ApiError> {
        serde_json::from_value(reply)
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("token response: {e}")).into())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs))
    }
}

/// Bearer token provider for tokens obtained through OAuth2.
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Auth {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    token_url: Option<String>,
    #[serde(skip)]
    revoke_url: Option<String>,
}

impl OAuth2Auth {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            client_id: None,
            token_url: None,
            revoke_url: None,
        }
    }

    pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Client id sent with refresh requests.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    async fn do_setup(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        let description = ctx
            .version()
            .authentication
            .oauth2
            .as_ref()
            .ok_or_else(|| AuthError::UnsupportedMethod {
                method: "oauth2".to_string(),
            })?;
        self.token_url = Some(ctx.connection().url(&description.token_url)?.to_string());
        self.revoke_url = description
            .revoke_url
            .as_deref()
            .map(|url| ctx.connection().url(url).map(|u| u.to_string()))
            .transpose()?;
        Ok(())
    }

    async fn refresh(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        let (Some(refresh_token), Some(token_url)) = (&self.refresh_token, &self.token_url) else {
            return Err(AuthError::TokenExpired.into());
        };
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        if let Some(client_id) = &self.client_id {
            form.push(("client_id", client_id.as_str()));
        }

        let reply = ctx.connection().post_form(token_url, &form).await?;
        let tokens = TokenResponse::parse(reply)?;
        self.expires_at = tokens.expires_at();
        self.access_token = tokens.access_token;
        if tokens.refresh_token.is_some() {
            self.refresh_token = tokens.refresh_token;
        }
        debug!("oauth2 access token refreshed");
        Ok(())
    }

    async fn do_authenticate(
        &mut self,
        ctx: &AuthContext,
        request: &mut OutgoingRequest,
    ) -> Result<(), ApiError> {
        if self.access_token.is_empty() {
            return Err(AuthError::NotConfigured {
                method: "oauth2".to_string(),
            }
            .into());
        }
        if self.is_expired() {
            self.refresh(ctx).await?;
        }
        request.apply_credentials(self.headers(), Vec::new())?;
        Ok(())
    }

    async fn do_logout(&mut self, ctx: &AuthContext) -> Result<(), ApiError> {
        if let Some(revoke_url) = &self.revoke_url {
            ctx.connection()
                .post_form(revoke_url, &[("token", self.access_token.as_str())])
                .await?;
            debug!("oauth2 access token revoked");
        }
        self.access_token.clear();
        self.refresh_token = None;
        self.expires_at = None;
        Ok(())
    }
}

impl std::fmt::Debug for OAuth2Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Auth")
            .field("expires_at", &self.expires_at)
            .field("client_id", &self.client_id)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

impl AuthProvider for OAuth2Auth {
    fn name(&self) -> &str {
        "oauth2"
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
        if self.access_token.is_empty() {
            return Vec::new();
        }
        vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.access_token),
        )]
    }

    fn renew<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.refresh(ctx))
    }

    fn logout<'a>(&'a mut self, ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(self.do_logout(ctx))
    }

    fn persist(&self) -> Option<PersistedAuth> {
        if self.access_token.is_empty() {
            return None;
        }
        Some(PersistedAuth {
            method: "oauth2".to_string(),
            data: serde_json::to_value(self).ok()?,
        })
    }

    fn restore(&mut self, data: &Value) -> Result<(), ApiError> {
        let restored: OAuth2Auth = serde_json::from_value(data.clone())
            .map_err(|e| ProtocolError::MalformedEnvelope(format!("persisted oauth2 session: {e}")))?;
        let revoke_url = self.revoke_url.take();
        *self = Self {
            revoke_url,
            ..restored
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AuthorizationRequest {
        let connection = Connection::new(
            reqwest::Client::new(),
            Url::parse("https://api.example.com").unwrap(),
        );
        let description = OAuth2Description {
            description: None,
            authorize_url: "/_auth/oauth2/authorize".to_string(),
            token_url: "/_auth/oauth2/token".to_string(),
            revoke_url: Some("/_auth/oauth2/revoke".to_string()),
        };
        AuthorizationRequest::new(&connection, &description, "cli", "http://localhost:8000/cb")
            .unwrap()
    }

    #[test]
    fn test_challenge_matches_rfc7636_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_challenge_is_unpadded_base64url() {
        let challenge = request().code_challenge();
        assert_eq!(challenge.len(), 43);
        assert!(challenge
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_'));
    }

    #[test]
    fn test_verifier_and_state_are_fresh() {
        let a = request();
        let b = request();
        assert_eq!(a.verifier.len(), VERIFIER_LEN);
        assert!(a.verifier.bytes().all(|b| VERIFIER_CHARSET.contains(&b)));
        assert_eq!(a.state().len(), STATE_LEN);
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn test_authorize_url() {
        let req = request().scope("all");
        let url = req.authorize_url();
        assert!(url.as_str().starts_with("https://api.example.com/_auth/oauth2/authorize?"));
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("response_type".to_string(), "code".to_string())));
        assert!(pairs.contains(&("code_challenge_method".to_string(), "S256".to_string())));
        assert!(pairs.contains(&("state".to_string(), req.state().to_string())));
        assert!(pairs.contains(&("code_challenge".to_string(), req.code_challenge())));
        assert!(pairs.contains(&("scope".to_string(), "all".to_string())));
    }

    #[test]
    fn test_validate_callback() {
        let req = request();
        let ok = format!("http://localhost:8000/cb?code=xyz&state={}", req.state());
        assert_eq!(req.validate_callback(&ok).unwrap(), "xyz");

        let forged = "http://localhost:8000/cb?code=xyz&state=forged";
        assert!(matches!(req.validate_callback(forged), Err(AuthError::StateMismatch)));

        let denied = "http://localhost:8000/cb?error=access_denied";
        assert!(matches!(
            req.validate_callback(denied),
            Err(AuthError::AuthorizationDenied { error }) if error == "access_denied"
        ));
    }

    #[test]
    fn test_bearer_header_and_persist() {
        let auth = OAuth2Auth::new("access").refresh_token("refresh").client_id("cli");
        assert_eq!(
            auth.headers(),
            [("Authorization".to_string(), "Bearer access".to_string())]
        );

        let persisted = auth.persist().unwrap();
        assert_eq!(persisted.method, "oauth2");
        let mut restored = OAuth2Auth::new("");
        restored.restore(&persisted.data).unwrap();
        assert_eq!(restored.access_token(), "access");
        assert_eq!(restored.refresh_token.as_deref(), Some("refresh"));
    }
}
