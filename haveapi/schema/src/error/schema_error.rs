//! Malformed description errors.

use thiserror::Error;

/// Errors raised while constructing a description from its JSON document.
///
/// These are fatal to client setup: a description that fails here is never
/// handed out partially.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The document did not match the expected structure.
    #[error("Malformed description: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The requested API version is not part of the description.
    #[error("Unknown API version: {version}")]
    UnknownVersion {
        /// The version that was asked for.
        version: String,
    },

    /// A resource parameter points at a resource path that does not exist
    /// or cannot be shown.
    #[error("Parameter `{parameter}` of {action} references unresolvable resource `{target}`")]
    UnresolvedAssociation {
        /// Dotted path of the action declaring the parameter.
        action: String,
        /// Parameter name.
        parameter: String,
        /// Dotted path of the referenced resource.
        target: String,
    },

    /// A validator definition could not be normalized.
    #[error("Invalid `{kind}` validator: {message}")]
    InvalidValidator {
        /// Validator kind as named in the description.
        kind: String,
        /// What was wrong with it.
        message: String,
    },
}

impl SchemaError {
    /// Creates an invalid validator error.
    pub fn invalid_validator(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValidator {
            kind: kind.into(),
            message: message.into(),
        }
    }
}
