//! Local input validation errors.

use std::collections::BTreeMap;
use std::fmt;

/// Input rejected before it was sent.
///
/// Carries every failing message grouped by parameter name, in the same
/// `{field: [messages]}` shape the server uses for its own validation
/// failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates an empty error collector.
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    /// Creates an error with a single message for one parameter.
    pub fn single(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::new();
        err.add(parameter, message);
        err
    }

    /// Records a message for a parameter.
    pub fn add(&mut self, parameter: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(parameter.into())
            .or_default()
            .push(message.into());
    }

    /// Records several messages for a parameter.
    pub fn extend(&mut self, parameter: &str, messages: impl IntoIterator<Item = String>) {
        let mut messages = messages.into_iter().peekable();
        if messages.peek().is_some() {
            self.errors
                .entry(parameter.to_string())
                .or_default()
                .extend(messages);
        }
    }

    /// Returns `true` when no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Messages for one parameter.
    pub fn messages(&self, parameter: &str) -> Option<&[String]> {
        self.errors.get(parameter).map(Vec::as_slice)
    }

    /// All messages keyed by parameter name.
    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// Consumes the error, returning the message map.
    pub fn into_errors(self) -> BTreeMap<String, Vec<String>> {
        self.errors
    }

    /// Returns `Err(self)` if any message was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Input validation failed")?;
        let mut first = true;
        for (parameter, messages) in &self.errors {
            write!(f, "{} {parameter}: {}", if first { ":" } else { ";" }, messages.join(", "))?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_messages_by_parameter() {
        let mut err = ValidationError::new();
        err.add("label", "must be present");
        err.add("label", "length has to be minimally 3");
        err.add("count", "has to be an integer");

        assert_eq!(err.messages("label").unwrap().len(), 2);
        assert_eq!(err.messages("count").unwrap(), ["has to be an integer"]);
        assert!(err.messages("other").is_none());
    }

    #[test]
    fn test_extend_with_nothing_adds_no_entry() {
        let mut err = ValidationError::new();
        err.extend("label", Vec::new());
        assert!(err.is_empty());
        assert!(err.into_result().is_ok());
    }

    #[test]
    fn test_display() {
        let mut err = ValidationError::single("a", "x");
        err.add("b", "y");
        err.add("b", "z");
        assert_eq!(err.to_string(), "Input validation failed: a: x; b: y, z");
    }
}
