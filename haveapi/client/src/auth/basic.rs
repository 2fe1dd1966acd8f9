//! HTTP basic authentication.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use super::{AuthContext, AuthProvider, BoxFuture};
use crate::error::ApiError;

/// Sends `Authorization: Basic base64(user:password)` with every request.
///
/// Stateless; there is nothing to set up, revoke or persist.
#[derive(Clone)]
pub struct BasicAuth {
    user: String,
    password: String,
}

impl BasicAuth {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AuthProvider for BasicAuth {
    fn name(&self) -> &str {
        "basic"
    }

    fn setup<'a>(&'a mut self, _ctx: &'a AuthContext) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async { Ok::<_, ApiError>(()) })
    }

    fn headers(&self) -> Vec<(String, String)> {
        let encoded = STANDARD.encode(format!("{}:{}", self.user, self.password));
        vec![("Authorization".to_string(), format!("Basic {encoded}"))]
    }

    fn restore(&mut self, _data: &Value) -> Result<(), ApiError> {
        Ok(())
    }
}
