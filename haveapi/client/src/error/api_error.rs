//! Top-level API error type.

use super::{ActionFailed, AuthError, ConfigError, ProtocolError, SchemaError, ValidationError};
use thiserror::Error;

/// Top-level error type for all client operations.
///
/// Variants split into local failures, detected before anything is sent,
/// and remote ones reported by the server or the transport.
///
/// ## Examples
///
/// ```rust,ignore
/// use haveapi_client::ApiError;
///
/// match client.resolve("project.create")?.into_action()?.call(input).await {
///     Ok(response) => println!("{:?}", response.output()?),
///     Err(ApiError::Validation(e)) => eprintln!("fix your input: {e}"),
///     Err(ApiError::ActionFailed(e)) => eprintln!("server said no: {e}"),
///     Err(e) => eprintln!("{e}"),
/// }
/// ```
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input failed local coercion or validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server answered with `status: false`.
    #[error(transparent)]
    ActionFailed(#[from] ActionFailed),

    /// Authentication errors.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A resource or action name did not resolve against the description.
    #[error("Object not found: {path}")]
    ObjectNotFound {
        /// The dotted path that failed to resolve.
        path: String,
    },

    /// An action was invoked with fewer path arguments than its URL needs.
    #[error("Action {action} requires {required} path arguments, {supplied} supplied")]
    UnresolvedArguments {
        /// Dotted path of the action.
        action: String,
        /// Number of placeholders in the URL template.
        required: usize,
        /// Number of arguments supplied.
        supplied: usize,
    },

    /// A path argument cannot be placed in a URL segment.
    #[error("Action {action} cannot use `{value}` as a path argument")]
    InvalidArgument {
        /// Dotted path of the action.
        action: String,
        value: String,
    },

    /// Transport, HTTP status or envelope errors.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A description document supplied offline was malformed.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Client configuration errors.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ApiError {
    /// Returns `true` for errors raised before any request was sent.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::ObjectNotFound { .. }
                | Self::UnresolvedArguments { .. }
                | Self::InvalidArgument { .. }
                | Self::Schema(_)
                | Self::Config(_)
        )
    }

    pub(crate) fn not_found(path: impl ToString) -> Self {
        Self::ObjectNotFound {
            path: path.to_string(),
        }
    }

    /// Returns the HTTP status code, if the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Protocol(e) => e.status_code(),
            Self::Auth(AuthError::AuthenticationFailed { .. }) => Some(401),
            _ => None,
        }
    }
}
