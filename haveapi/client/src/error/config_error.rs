//! Client configuration errors.

use thiserror::Error;

/// Errors in client configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The base URL could not be parsed.
    #[error("Invalid API URL {url}: {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    /// A required environment variable is not set.
    #[error("Missing environment variable {var}")]
    MissingEnv {
        var: String,
    },

    /// An environment variable holds an unusable value.
    #[error("Invalid value in {var}: {reason}")]
    InvalidEnv {
        var: String,
        reason: String,
    },

    /// A default header name or value is invalid.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_display() {
        let err = ConfigError::MissingEnv {
            var: "HAVEAPI_URL".to_string(),
        };
        assert_eq!(err.to_string(), "Missing environment variable HAVEAPI_URL");
    }
}
