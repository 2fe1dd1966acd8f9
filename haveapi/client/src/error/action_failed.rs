//! Server-side action failures.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// The server processed the request but refused the action.
///
/// Carries the envelope's message and its per-parameter errors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionFailed {
    pub message: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ActionFailed {
    /// Creates a failure from the envelope's `message` and `errors` fields.
    ///
    /// `errors` may map a parameter to a single string or to a list of
    /// strings; anything else is rendered as JSON.
    pub fn from_envelope(message: Option<String>, errors: Option<&Value>) -> Self {
        let mut grouped = BTreeMap::new();
        if let Some(Value::Object(map)) = errors {
            for (param, messages) in map {
                let messages = match messages {
                    Value::Array(items) => items.iter().map(text).collect(),
                    other => vec![text(other)],
                };
                grouped.insert(param.clone(), messages);
            }
        }
        Self {
            message: message.unwrap_or_else(|| "action failed".to_string()),
            errors: grouped,
        }
    }

    /// Messages reported for a parameter.
    pub fn field(&self, parameter: &str) -> Option<&[String]> {
        self.errors.get(parameter).map(Vec::as_slice)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl std::error::Error for ActionFailed {}

impl fmt::Display for ActionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action failed: {}", self.message)?;
        for (param, messages) in &self.errors {
            write!(f, "; {param}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}
