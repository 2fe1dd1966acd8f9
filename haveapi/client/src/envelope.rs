//! The response envelope every HaveAPI reply is wrapped in.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::ActionFailed;

/// Parsed `{status, response, message, errors, meta?, version?}` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub status: bool,
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub errors: Option<Value>,
    /// Top-level meta, sent by some servers next to `response`.
    #[serde(default)]
    pub meta: Option<Map<String, Value>>,
    /// Protocol version of the server.
    #[serde(default)]
    pub version: Option<String>,
}

impl Envelope {
    /// Parses a response body.
    ///
    /// ## Errors
    ///
    /// Returns the parse error message when the body is not an envelope.
    pub fn parse(body: &str) -> Result<Self, String> {
        serde_json::from_str(body).map_err(|e| e.to_string())
    }

    /// Converts `status: false` into [`ActionFailed`].
    pub fn into_result(self) -> Result<Self, ActionFailed> {
        if self.status {
            Ok(self)
        } else {
            Err(ActionFailed::from_envelope(self.message, self.errors.as_ref()))
        }
    }

    /// Response meta data.
    ///
    /// Looks in the top-level `meta` first and then under the meta
    /// namespace inside `response`, which is where HaveAPI servers put it.
    pub fn meta(&self, namespace: &str) -> Option<&Map<String, Value>> {
        self.meta
            .as_ref()
            .or_else(|| self.response.get(namespace).and_then(Value::as_object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let env = Envelope::parse(
            r#"{"status": true, "response": {"project": {"id": 1}, "_meta": {"total_count": 3}}, "message": null, "errors": null}"#,
        )
        .unwrap();
        assert!(env.status);
        assert_eq!(env.meta("_meta").unwrap()["total_count"], 3);
        assert!(env.into_result().is_ok());
    }

    #[test]
    fn test_failure_into_action_failed() {
        let env = Envelope::parse(
            r#"{"status": false, "response": null, "message": "invalid input", "errors": {"label": ["too short"]}}"#,
        )
        .unwrap();
        let failed = env.into_result().unwrap_err();
        assert_eq!(failed.message, "invalid input");
        assert_eq!(failed.field("label").unwrap(), ["too short"]);
    }

    #[test]
    fn test_top_level_meta_wins() {
        let env = Envelope::parse(
            r#"{"status": true, "response": {"_meta": {"a": 1}}, "meta": {"b": 2}, "version": "2.0"}"#,
        )
        .unwrap();
        assert!(env.meta("_meta").unwrap().contains_key("b"));
        assert_eq!(env.version.as_deref(), Some("2.0"));
    }

    #[test]
    fn test_not_an_envelope() {
        assert!(Envelope::parse("<html>").is_err());
        assert!(Envelope::parse(r#"{"response": {}}"#).is_err());
    }
}
