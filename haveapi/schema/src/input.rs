//! Preparation of action input: presence, nullability, coercion and
//! validation, in that order, with every failure collected.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use crate::coerce::{coerce, InputValue};
use crate::description::IoSpec;
use crate::error::ValidationError;

/// Caller-supplied parameters, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, InputValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any previous value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InputValue)> {
        self.0.iter()
    }

    /// Copies every entry of `other` that is not set here.
    pub fn merge_missing(&mut self, other: &Params) {
        for (name, value) in &other.0 {
            self.0.entry(name.clone()).or_insert_with(|| value.clone());
        }
    }
}

/// Builds params from a JSON object; any other value yields no params.
impl From<Value> for Params {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            Value::Null => Self::default(),
            other => {
                warn!(value = %other, "ignoring non-object input");
                Self::default()
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<InputValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Validates and coerces `params` against an action's input spec.
///
/// Parameters the spec does not declare are dropped with a warning. The
/// returned map holds wire-ready values for every supplied parameter.
///
/// ## Errors
///
/// Returns a [`ValidationError`] grouping every failure by parameter name
/// when any parameter is missing, wrongly null, uncoercible or fails one
/// of its validators.
pub fn prepare_input(io: &IoSpec, params: &Params) -> Result<Map<String, Value>, ValidationError> {
    for name in params.0.keys() {
        if io.parameter(name).is_none() {
            warn!(parameter = %name, namespace = %io.namespace, "dropping undeclared parameter");
        }
    }

    let mut errors = ValidationError::new();
    let mut coerced = Map::new();
    // Values that passed coercion and still need their validators run; the
    // second pass sees the whole coerced input so `confirm` can compare.
    let mut to_validate = Vec::new();

    for (name, param) in &io.parameters {
        let Some(value) = params.get(name) else {
            if param.required {
                errors.add(name.clone(), "required parameter missing");
            }
            continue;
        };

        if param.nullable && value.is_blank() {
            coerced.insert(name.clone(), Value::Null);
            continue;
        }
        if value.is_null() {
            errors.add(name.clone(), "cannot be null");
            continue;
        }

        match coerce(param, value) {
            Ok(v) => {
                coerced.insert(name.clone(), v);
                to_validate.push((name, param));
            }
            Err(message) => errors.add(name.clone(), message),
        }
    }

    for (name, param) in to_validate {
        let value = &coerced[name.as_str()];
        errors.extend(name, param.validators.check(value, &coerced));
    }

    errors.into_result().map(|()| coerced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::{Layout, ParameterDescriptor, ParameterType};
    use crate::validator::Validators;
    use serde_json::json;

    fn validators(raw: Value) -> Validators {
        serde_json::from_value(raw).unwrap()
    }

    fn project_input() -> IoSpec {
        IoSpec::new(Layout::Object, "project")
            .param(
                "label",
                ParameterDescriptor::new(ParameterType::String)
                    .required()
                    .with_validators(validators(json!({
                        "length": {"min": 3, "max": 10, "message": "length must be between %{min} and %{max}"},
                        "format": {"rx": "^[a-z]+$", "match": true, "message": "%{value} is not lowercase"}
                    }))),
            )
            .param(
                "priority",
                ParameterDescriptor::new(ParameterType::Integer).with_validators(validators(json!({
                    "number": {"min": 1, "max": 5, "message": "must be in 1..5"}
                }))),
            )
            .param("note", ParameterDescriptor::new(ParameterType::Text).nullable())
            .param("deadline", ParameterDescriptor::new(ParameterType::Datetime))
    }

    #[test]
    fn test_valid_input_is_coerced() {
        let params = Params::new()
            .set("label", "alpha")
            .set("priority", "3")
            .set("deadline", "2024-05-01");

        let prepared = prepare_input(&project_input(), &params).unwrap();
        assert_eq!(prepared["label"], json!("alpha"));
        assert_eq!(prepared["priority"], json!(3));
        assert_eq!(prepared["deadline"], json!("2024-05-01T00:00:00Z"));
        assert!(!prepared.contains_key("note"));
    }

    #[test]
    fn test_every_failure_is_reported() {
        let params = Params::new()
            .set("label", "AB")
            .set("priority", 9)
            .set("deadline", "2020-02-30");

        let err = prepare_input(&project_input(), &params).unwrap_err();
        assert_eq!(
            err.messages("label").unwrap(),
            ["AB is not lowercase", "length must be between 3 and 10"]
        );
        assert_eq!(err.messages("priority").unwrap(), ["must be in 1..5"]);
        assert_eq!(err.messages("deadline").unwrap(), ["not in ISO 8601 format"]);
    }

    #[test]
    fn test_missing_required() {
        let err = prepare_input(&project_input(), &Params::new()).unwrap_err();
        assert_eq!(err.messages("label").unwrap(), ["required parameter missing"]);
        assert_eq!(err.errors().len(), 1);
    }

    #[test]
    fn test_nullable_accepts_null_and_empty() {
        for blank in [json!(null), json!("")] {
            let params = Params::new().set("label", "abc").set("note", blank);
            let prepared = prepare_input(&project_input(), &params).unwrap();
            assert_eq!(prepared["note"], Value::Null);
        }
    }

    #[test]
    fn test_null_on_non_nullable() {
        let params = Params::new().set("label", "abc").set("priority", Value::Null);
        let err = prepare_input(&project_input(), &params).unwrap_err();
        assert_eq!(err.messages("priority").unwrap(), ["cannot be null"]);
    }

    #[test]
    fn test_coercion_failure_skips_validators() {
        let params = Params::new().set("label", "abc").set("priority", 1.5);
        let err = prepare_input(&project_input(), &params).unwrap_err();
        assert_eq!(err.messages("priority").unwrap(), ["not a valid integer"]);
    }

    #[test]
    fn test_undeclared_parameters_are_dropped() {
        let params = Params::from(json!({"label": "abc", "owner": 7}));
        let prepared = prepare_input(&project_input(), &params).unwrap();
        assert!(!prepared.contains_key("owner"));
    }

    #[test]
    fn test_confirm_sees_other_parameters() {
        let io = IoSpec::new(Layout::Object, "user")
            .param("password", ParameterDescriptor::new(ParameterType::String))
            .param(
                "password_confirmation",
                ParameterDescriptor::new(ParameterType::String).with_validators(validators(
                    json!({"confirm": {"param": "password", "message": "must match %{parameter}"}}),
                )),
            );

        let ok = Params::new()
            .set("password", "secret")
            .set("password_confirmation", "secret");
        assert!(prepare_input(&io, &ok).is_ok());

        let mismatch = Params::new()
            .set("password", "secret")
            .set("password_confirmation", "other");
        let err = prepare_input(&io, &mismatch).unwrap_err();
        assert_eq!(
            err.messages("password_confirmation").unwrap(),
            ["must match password"]
        );
    }

    #[test]
    fn test_merge_missing_keeps_existing() {
        let mut params = Params::new().set("a", 1);
        params.merge_missing(&Params::new().set("a", 2).set("b", 3));
        assert_eq!(params.get("a"), Some(&InputValue::from(1)));
        assert_eq!(params.get("b"), Some(&InputValue::from(3)));
    }
}
