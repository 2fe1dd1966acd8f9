//! Client configuration from files or the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{ClientBuilder, DEFAULT_TIMEOUT_SECS};
use crate::error::{ApiError, ConfigError};
use crate::Client;

pub const ENV_URL: &str = "HAVEAPI_URL";
pub const ENV_VERSION: &str = "HAVEAPI_VERSION";
pub const ENV_TIMEOUT_SECS: &str = "HAVEAPI_TIMEOUT_SECS";

/// Serializable client settings.
///
/// ```
/// use haveapi_client::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{"url": "https://api.example.com"}"#)?;
/// assert_eq!(config.timeout_secs, 30);
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            version: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: None,
        }
    }

    /// Reads `HAVEAPI_URL`, `HAVEAPI_VERSION` and `HAVEAPI_TIMEOUT_SECS`.
    ///
    /// ## Errors
    ///
    /// Returns [`ConfigError::MissingEnv`] without a URL and
    /// [`ConfigError::InvalidEnv`] for a timeout that is not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let url = lookup(ENV_URL)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::MissingEnv {
                var: ENV_URL.to_string(),
            })?;

        let timeout_secs = match lookup(ENV_TIMEOUT_SECS) {
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidEnv {
                var: ENV_TIMEOUT_SECS.to_string(),
                reason: format!("{e}"),
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            url,
            version: lookup(ENV_VERSION).filter(|v| !v.is_empty()),
            timeout_secs,
            user_agent: None,
        })
    }

    /// A client builder with these settings applied.
    pub fn builder(&self) -> Result<ClientBuilder, ApiError> {
        let mut builder = Client::builder(&self.url).timeout(Duration::from_secs(self.timeout_secs));
        if let Some(version) = &self.version {
            builder = builder.version(version);
        }
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent)?;
        }
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(|var| match var {
            ENV_URL => Some("https://api.example.com".to_string()),
            ENV_VERSION => Some("2".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.url, "https://api.example.com");
        assert_eq!(config.version.as_deref(), Some("2"));
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_missing_url() {
        let err = ClientConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv { var } if var == ENV_URL));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = ClientConfig::from_lookup(|var| match var {
            ENV_URL => Some("https://api.example.com".to_string()),
            ENV_TIMEOUT_SECS => Some("soon".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == ENV_TIMEOUT_SECS));
    }

    #[test]
    fn test_builds_client() {
        let mut config = ClientConfig::new("https://api.example.com");
        config.user_agent = Some("haveapi-test/1.0".to_string());
        assert!(Client::from_config(&config).is_ok());
    }
}
