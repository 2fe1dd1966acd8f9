//! Transport and wire protocol errors.

use thiserror::Error;

use super::SchemaError;

/// Errors from the HTTP transport and the response envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// HTTP request failed due to network or protocol error.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned a non-success status without a readable envelope.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        /// Response body, or the status text when the body was empty.
        message: String,
    },

    /// The response body is not a valid envelope.
    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    /// The fetched description document could not be loaded.
    #[error("Invalid API description: {0}")]
    Description(#[from] SchemaError),

    /// The description could not be fetched.
    #[error("Failed to fetch API description: {message}")]
    DescriptionFetch {
        message: String,
    },

    /// A URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// An operation needed the description before `setup` was run.
    #[error("Client is not set up; call setup() first")]
    NotSetUp,

    /// The output does not have the shape the caller asked for.
    #[error("Unexpected output: expected {expected}, got {actual}")]
    UnexpectedOutput {
        expected: String,
        actual: String,
    },
}

impl ProtocolError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_500_is_retryable() {
        let err = ProtocolError::HttpStatus {
            status: 500,
            message: "Internal Server Error".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), Some(500));
    }

    #[test]
    fn test_404_not_retryable() {
        let err = ProtocolError::HttpStatus {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_set_up_display() {
        assert_eq!(
            ProtocolError::NotSetUp.to_string(),
            "Client is not set up; call setup() first"
        );
    }
}
