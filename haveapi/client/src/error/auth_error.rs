//! Authentication errors.

use thiserror::Error;

/// Errors raised while selecting, setting up or using an authentication
/// provider, or when the server rejects credentials.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No provider is registered under this name.
    #[error("Unknown authentication method: {method}")]
    UnknownMethod {
        method: String,
    },

    /// The API version does not declare this method.
    #[error("Authentication method {method} is not supported by this API")]
    UnsupportedMethod {
        method: String,
    },

    /// Server rejected the credentials.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message from the server.
        message: String,
    },

    /// The token expired and no credentials are held to request a new one.
    #[error("Authentication failed: token expired")]
    TokenExpired,

    /// A required credential was not supplied.
    #[error("Missing credential: {name}")]
    MissingCredential {
        name: String,
    },

    /// A multi-step token request asked for input the caller did not give.
    #[error("Authentication step {action} was declined")]
    StepDeclined {
        action: String,
    },

    /// An OAuth2 callback carried a different `state` than was sent.
    #[error("OAuth2 state mismatch")]
    StateMismatch,

    /// The authorization server denied the OAuth2 request.
    #[error("Authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
    },

    /// A credential could not be encoded as a header value.
    #[error("Invalid credential format: {0}")]
    InvalidFormat(String),

    /// The provider was used before it was set up.
    #[error("Authentication provider {method} is not set up")]
    NotConfigured {
        method: String,
    },
}

impl AuthError {
    /// Returns `true` if this error could potentially be resolved by
    /// authenticating again.
    pub fn is_refreshable(&self) -> bool {
        matches!(self, Self::TokenExpired | Self::AuthenticationFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expired_display() {
        assert_eq!(
            AuthError::TokenExpired.to_string(),
            "Authentication failed: token expired"
        );
        assert!(AuthError::TokenExpired.is_refreshable());
    }

    #[test]
    fn test_unknown_method_not_refreshable() {
        let err = AuthError::UnknownMethod {
            method: "kerberos".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown authentication method: kerberos");
        assert!(!err.is_refreshable());
    }
}
