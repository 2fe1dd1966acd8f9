//! Authentication methods declared by a version.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::resource::{named_resources, ResourceDescriptor};

/// HTTP basic authentication.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasicDescription {
    #[serde(default)]
    pub description: Option<String>,
}

/// Token authentication and its sub-protocol resource.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenDescription {
    #[serde(default)]
    pub description: Option<String>,
    /// Header the token is sent in.
    #[serde(default = "default_token_header")]
    pub http_header: String,
    /// Query parameter the token is sent in.
    #[serde(default = "default_token_query")]
    pub query_parameter: String,
    /// Resources of the token sub-protocol, normally a single `token`
    /// resource with `request`, `renew` and `revoke` actions.
    #[serde(default, deserialize_with = "named_resources")]
    pub resources: BTreeMap<String, ResourceDescriptor>,
}

fn default_token_header() -> String {
    "X-HaveAPI-Auth-Token".to_string()
}

fn default_token_query() -> String {
    "_auth_token".to_string()
}

impl TokenDescription {
    /// The resource holding `request`, `renew` and `revoke`.
    pub fn token_resource(&self) -> Option<&ResourceDescriptor> {
        self.resources
            .get("token")
            .or_else(|| self.resources.values().next())
    }
}

/// OAuth2 authorization-code endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Description {
    #[serde(default)]
    pub description: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    #[serde(default)]
    pub revoke_url: Option<String>,
}

/// Authentication methods a version declares, keyed by method name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthMethods {
    #[serde(default)]
    pub basic: Option<BasicDescription>,
    #[serde(default)]
    pub token: Option<TokenDescription>,
    #[serde(default)]
    pub oauth2: Option<OAuth2Description>,
    /// Methods this client has no typed description for.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl AuthMethods {
    /// Returns `true` if the method is declared.
    pub fn declares(&self, method: &str) -> bool {
        match method {
            "basic" => self.basic.is_some(),
            "token" => self.token.is_some(),
            "oauth2" => self.oauth2.is_some(),
            other => self.other.contains_key(other),
        }
    }

    /// Names of every declared method.
    pub fn names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        if self.basic.is_some() {
            names.push("basic");
        }
        if self.token.is_some() {
            names.push("token");
        }
        if self.oauth2.is_some() {
            names.push("oauth2");
        }
        names.extend(self.other.keys().map(String::as_str));
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_token_description() {
        let methods: AuthMethods = serde_json::from_value(json!({
            "token": {
                "http_header": "X-Auth",
                "resources": {
                    "token": {
                        "actions": {
                            "request": {"method": "POST", "url": "/_auth/token/tokens", "auth": false}
                        }
                    }
                }
            }
        }))
        .unwrap();

        let token = methods.token.as_ref().unwrap();
        assert_eq!(token.http_header, "X-Auth");
        assert_eq!(token.query_parameter, "_auth_token");
        let resource = token.token_resource().unwrap();
        assert_eq!(resource.name, "token");
        assert!(!resource.action("request").unwrap().auth);
        assert!(methods.declares("token"));
        assert!(!methods.declares("basic"));
    }

    #[test]
    fn test_unknown_methods_are_kept() {
        let methods: AuthMethods = serde_json::from_value(json!({
            "basic": {},
            "kerberos": {"realm": "EXAMPLE"}
        }))
        .unwrap();
        assert_eq!(methods.names(), ["basic", "kerberos"]);
        assert!(methods.declares("kerberos"));
    }
}
