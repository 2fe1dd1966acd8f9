//! Name-to-provider registry.
//!
//! Maps method names as they appear in a description's `authentication`
//! section to factories building providers from loose [`AuthOptions`].
//! Callers can register their own methods next to the built-in ones.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{AuthProvider, AuthToken, BasicAuth, OAuth2Auth, PersistedAuth, TokenAuth, TokenLifetime};
use crate::error::{ApiError, AuthError, ConfigError};

/// Loose provider options, as they might come from a config file, the
/// environment or a command line.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthOptions {
    pub user: Option<String>,
    pub password: Option<String>,
    /// A token issued earlier.
    pub token: Option<String>,
    pub lifetime: Option<TokenLifetime>,
    pub interval: Option<u64>,
    pub scope: Option<String>,
    /// Send the token as a query parameter.
    pub via_query: bool,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
}

impl AuthOptions {
    pub fn credentials(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            password: Some(password.into()),
            ..Self::default()
        }
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::default()
        }
    }

    /// Reads user and password from the named environment variables.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] naming the first unset variable.
    pub fn basic_from_env(user_var: &str, password_var: &str) -> Result<Self, ConfigError> {
        Self::basic_from_lookup(user_var, password_var, |var| std::env::var(var).ok())
    }

    /// Reads a previously issued token from the named environment variable.
    pub fn token_from_env(var: &str) -> Result<Self, ConfigError> {
        Self::token_from_lookup(var, |var| std::env::var(var).ok())
    }

    pub(crate) fn basic_from_lookup(
        user_var: &str,
        password_var: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::credentials(
            require_env(&lookup, user_var)?,
            require_env(&lookup, password_var)?,
        ))
    }

    pub(crate) fn token_from_lookup(
        var: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::token(require_env(&lookup, var)?))
    }
}

fn require_env(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<String, ConfigError> {
    lookup(var)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv {
            var: var.to_string(),
        })
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("user", &self.user)
            .field("has_password", &self.password.is_some())
            .field("has_token", &self.token.is_some())
            .field("lifetime", &self.lifetime)
            .field("interval", &self.interval)
            .field("scope", &self.scope)
            .field("via_query", &self.via_query)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Builds a provider from options.
pub type AuthFactory =
    Arc<dyn Fn(AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> + Send + Sync>;

/// Registry of authentication methods.
///
/// [`AuthRegistry::with_defaults`] knows `basic`, `token` and `oauth2`.
#[derive(Clone)]
pub struct AuthRegistry {
    factories: BTreeMap<String, AuthFactory>,
}

impl AuthRegistry {
    /// A registry without any methods.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the built-in methods.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register("basic", basic_factory)
            .register("token", token_factory)
            .register("oauth2", oauth2_factory);
        registry
    }

    /// Registers a method, replacing any previous factory of that name.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Builds a provider for a registered method.
    ///
    /// ## Errors
    ///
    /// Returns [`AuthError::UnknownMethod`] for unregistered names, or the
    /// factory's own error when options are missing.
    pub fn create(&self, name: &str, options: AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AuthError::UnknownMethod {
                method: name.to_string(),
            })?;
        factory(options)
    }

    /// Rebuilds a provider from persisted state. The provider still has to
    /// be set up against a client before use.
    pub fn restore(&self, persisted: &PersistedAuth) -> Result<Box<dyn AuthProvider>, ApiError> {
        self.restore_with(persisted, AuthOptions::default())
    }

    /// Like [`restore`](Self::restore), but builds the provider from
    /// `options` first, so settings such as the token transport carry over.
    pub fn restore_with(
        &self,
        persisted: &PersistedAuth,
        options: AuthOptions,
    ) -> Result<Box<dyn AuthProvider>, ApiError> {
        let mut provider = self.create(&persisted.method, options)?;
        provider.restore(&persisted.data)?;
        Ok(provider)
    }
}

impl Default for AuthRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

fn missing(name: &str) -> AuthError {
    AuthError::MissingCredential {
        name: name.to_string(),
    }
}

fn basic_factory(options: AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> {
    let user = options.user.ok_or_else(|| missing("user"))?;
    let password = options.password.ok_or_else(|| missing("password"))?;
    Ok(Box::new(BasicAuth::new(user, password)))
}

/// Without a token or credentials the provider starts empty; setup then
/// fails unless state is restored first.
fn token_factory(options: AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> {
    let mut auth = match (options.token, options.user, options.password) {
        (Some(token), _, _) => TokenAuth::with_token(AuthToken::new(token, None)),
        (None, Some(user), Some(password)) => TokenAuth::new(user, password),
        (None, Some(_), None) => return Err(missing("password")),
        (None, None, _) => TokenAuth::empty(),
    };
    if let Some(lifetime) = options.lifetime {
        auth = auth.lifetime(lifetime);
    }
    if let Some(interval) = options.interval {
        auth = auth.interval(interval);
    }
    if let Some(scope) = options.scope {
        auth = auth.scope(scope);
    }
    if options.via_query {
        auth = auth.via_query();
    }
    Ok(Box::new(auth))
}

fn oauth2_factory(options: AuthOptions) -> Result<Box<dyn AuthProvider>, AuthError> {
    let mut auth = OAuth2Auth::new(options.access_token.unwrap_or_default());
    if let Some(refresh_token) = options.refresh_token {
        auth = auth.refresh_token(refresh_token);
    }
    if let Some(client_id) = options.client_id {
        auth = auth.client_id(client_id);
    }
    Ok(Box::new(auth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let registry = AuthRegistry::with_defaults();
        assert_eq!(registry.names(), ["basic", "oauth2", "token"]);
    }

    #[test]
    fn test_unknown_method() {
        let err = AuthRegistry::with_defaults()
            .create("kerberos", AuthOptions::default())
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownMethod { method } if method == "kerberos"));
    }

    #[test]
    fn test_basic_requires_password() {
        let registry = AuthRegistry::with_defaults();
        let err = registry
            .create(
                "basic",
                AuthOptions {
                    user: Some("user".to_string()),
                    ..AuthOptions::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingCredential { name } if name == "password"));

        let provider = registry
            .create("basic", AuthOptions::credentials("user", "secret"))
            .unwrap();
        assert_eq!(provider.name(), "basic");
    }

    #[test]
    fn test_custom_method() {
        let mut registry = AuthRegistry::empty();
        registry.register("static", |options: AuthOptions| {
            let token = options.token.ok_or_else(|| missing("token"))?;
            Ok(Box::new(BasicAuth::new("static", token)) as Box<dyn AuthProvider>)
        });
        assert!(registry.contains("static"));
        assert!(!registry.contains("basic"));
        assert!(registry.create("static", AuthOptions::token("t")).is_ok());
    }

    #[test]
    fn test_restore_token() {
        let persisted = PersistedAuth {
            method: "token".to_string(),
            data: json!({"token": "abc", "valid_to": null}),
        };
        let provider = AuthRegistry::with_defaults().restore(&persisted).unwrap();
        assert_eq!(provider.persist().unwrap().data["token"], "abc");
    }

    #[test]
    fn test_options_from_lookup() {
        let env = |var: &str| match var {
            "API_USER" => Some("admin".to_string()),
            "API_PASSWORD" => Some("secret".to_string()),
            _ => None,
        };
        let options = AuthOptions::basic_from_lookup("API_USER", "API_PASSWORD", env).unwrap();
        assert_eq!(options.user.as_deref(), Some("admin"));

        let err = AuthOptions::token_from_lookup("API_TOKEN", env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { var } if var == "API_TOKEN"));
    }

    #[test]
    fn test_options_debug_redacts() {
        let debug = format!("{:?}", AuthOptions::credentials("admin", "hunter2"));
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"));
    }
}
