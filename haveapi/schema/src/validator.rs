//! Parameter validators.
//!
//! Descriptions ship validators as a map from kind to options. Options come
//! either in full form (`{"present": {"empty": false, "message": "..."}}`) or
//! in a short form (`{"present": true}`, `{"format": "\\A\\d+\\z"}`).
//! [`Validator::normalize`] expands both into one typed options record per
//! kind, so checking never has to look at raw JSON again.
//!
//! Validators run on coerced values. Each failing validator contributes one
//! message; the caller collects all of them.

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Choice set used by inclusion and exclusion validators.
#[derive(Debug, Clone, PartialEq)]
pub enum Choices {
    /// Plain list of allowed (or forbidden) values.
    List(Vec<Value>),
    /// Map from value to human readable label.
    Map(Map<String, Value>),
}

impl Choices {
    fn from_value(kind: &str, raw: &Value) -> Result<Self, SchemaError> {
        match raw {
            Value::Array(values) => Ok(Self::List(values.clone())),
            Value::Object(map) => Ok(Self::Map(map.clone())),
            other => Err(SchemaError::invalid_validator(
                kind,
                format!("expected a list or map of values, got {other}"),
            )),
        }
    }

    /// Returns `true` if `value` is one of the choices.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Self::List(values) => values.iter().any(|v| loosely_equal(v, value)),
            Self::Map(map) => map.contains_key(&display(value)),
        }
    }
}

/// Options of the `present` validator.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentOptions {
    /// Whether an empty (whitespace-only) string counts as present.
    pub empty: bool,
    pub message: String,
}

/// Options of the `include` and `exclude` validators.
#[derive(Debug, Clone, PartialEq)]
pub struct InclusionOptions {
    pub values: Choices,
    pub message: String,
}

/// Options of the `length` validator.
#[derive(Debug, Clone, PartialEq)]
pub struct LengthOptions {
    pub min: Option<usize>,
    pub max: Option<usize>,
    pub equals: Option<usize>,
    pub message: String,
}

/// Options of the `number` validator.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberOptions {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub modulo: Option<f64>,
    pub odd: bool,
    pub even: bool,
    pub message: String,
}

/// Options of the `format` validator.
#[derive(Debug, Clone)]
pub struct FormatOptions {
    pub rx: Regex,
    /// `true` if the value must match, `false` if it must not.
    pub matches: bool,
    pub description: Option<String>,
    pub message: String,
}

/// Options of the `confirm` validator.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOptions {
    /// Name of the parameter this one is compared with.
    pub parameter: String,
    /// `true` if both must be equal, `false` if they must differ.
    pub equal: bool,
    pub message: String,
}

/// Options of the `accept` validator.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptOptions {
    pub value: Value,
    pub message: String,
}

/// A normalized validator.
#[derive(Debug, Clone)]
pub enum Validator {
    Present(PresentOptions),
    Include(InclusionOptions),
    Exclude(InclusionOptions),
    Length(LengthOptions),
    Number(NumberOptions),
    Format(FormatOptions),
    Confirm(ConfirmOptions),
    Accept(AcceptOptions),
    /// Server-side only check, described in prose. Always passes locally.
    Custom { description: Option<String> },
}

impl Validator {
    /// Expands a validator definition into its typed form.
    ///
    /// Returns `Ok(None)` for definitions that disable the validator
    /// (`"present": false`) and for kinds this client does not know.
    pub fn normalize(kind: &str, raw: &Value) -> Result<Option<Self>, SchemaError> {
        let validator = match kind {
            "present" | "presence" | "required" => match raw {
                Value::Bool(false) | Value::Null => return Ok(None),
                Value::Bool(true) => Self::Present(PresentOptions {
                    empty: false,
                    message: present_message(false),
                }),
                Value::Object(opts) => {
                    let empty = opt_bool(opts, "empty").unwrap_or(false);
                    Self::Present(PresentOptions {
                        empty,
                        message: opt_message(opts).unwrap_or_else(|| present_message(empty)),
                    })
                }
                other => return Err(unexpected(kind, other)),
            },
            "include" | "inclusion" | "exclude" | "exclusion" => {
                let (values, message) = match raw {
                    Value::Object(opts) if opts.contains_key("values") => (
                        Choices::from_value(kind, &opts["values"])?,
                        opt_message(opts),
                    ),
                    other => (Choices::from_value(kind, other)?, None),
                };
                let options = InclusionOptions {
                    values,
                    message: message.unwrap_or_else(|| "%{value} cannot be used".to_string()),
                };
                if kind.starts_with("inc") {
                    Self::Include(options)
                } else {
                    Self::Exclude(options)
                }
            }
            "length" => match raw {
                Value::Number(n) => {
                    let equals = n.as_u64().map(|n| n as usize);
                    Self::Length(LengthOptions {
                        min: None,
                        max: None,
                        equals,
                        message: length_message(None, None, equals),
                    })
                }
                Value::Object(opts) => {
                    let min = opt_usize(opts, "min");
                    let max = opt_usize(opts, "max");
                    let equals = opt_usize(opts, "equals");
                    Self::Length(LengthOptions {
                        min,
                        max,
                        equals,
                        message: opt_message(opts)
                            .unwrap_or_else(|| length_message(min, max, equals)),
                    })
                }
                other => return Err(unexpected(kind, other)),
            },
            "number" | "numericality" => {
                let Value::Object(opts) = raw else {
                    return Err(unexpected(kind, raw));
                };
                let min = opt_f64(opts, "min");
                let max = opt_f64(opts, "max");
                let step = opt_f64(opts, "step");
                let modulo = opt_f64(opts, "mod");
                if step == Some(0.0) || modulo == Some(0.0) {
                    return Err(SchemaError::invalid_validator(kind, "step and mod must be non-zero"));
                }
                let odd = opt_bool(opts, "odd").unwrap_or(false);
                let even = opt_bool(opts, "even").unwrap_or(false);
                Self::Number(NumberOptions {
                    min,
                    max,
                    step,
                    modulo,
                    odd,
                    even,
                    message: opt_message(opts)
                        .unwrap_or_else(|| number_message(min, max, step, modulo, odd, even)),
                })
            }
            "format" => {
                let (rx, matches, description, message) = match raw {
                    Value::String(rx) => (rx.clone(), true, None, None),
                    Value::Object(opts) => {
                        let Some(rx) = opts.get("rx").and_then(Value::as_str) else {
                            return Err(SchemaError::invalid_validator(kind, "missing rx"));
                        };
                        (
                            rx.to_string(),
                            opt_bool(opts, "match").unwrap_or(true),
                            opts.get("description").and_then(Value::as_str).map(str::to_string),
                            opt_message(opts),
                        )
                    }
                    other => return Err(unexpected(kind, other)),
                };
                let rx = match Regex::new(&rx) {
                    Ok(rx) => rx,
                    Err(e) => {
                        // The server still enforces the pattern.
                        tracing::warn!(rx = %rx, error = %e, "skipping unsupported format pattern");
                        return Ok(None);
                    }
                };
                Self::Format(FormatOptions {
                    rx,
                    matches,
                    description,
                    message: message.unwrap_or_else(|| "%{value} is not in a valid format".to_string()),
                })
            }
            "confirm" | "confirmation" => {
                let (parameter, equal, message) = match raw {
                    Value::String(param) => (param.clone(), true, None),
                    Value::Object(opts) => {
                        let Some(param) = opts.get("param").and_then(Value::as_str) else {
                            return Err(SchemaError::invalid_validator(kind, "missing param"));
                        };
                        (
                            param.to_string(),
                            opt_bool(opts, "equal").unwrap_or(true),
                            opt_message(opts),
                        )
                    }
                    other => return Err(unexpected(kind, other)),
                };
                let message = message.unwrap_or_else(|| {
                    if equal {
                        "must be the same as %{parameter}".to_string()
                    } else {
                        "must be different from %{parameter}".to_string()
                    }
                });
                Self::Confirm(ConfirmOptions {
                    parameter,
                    equal,
                    message,
                })
            }
            "accept" | "acceptance" => {
                let (value, message) = match raw {
                    Value::Object(opts) if opts.contains_key("value") => {
                        (opts["value"].clone(), opt_message(opts))
                    }
                    other => (other.clone(), None),
                };
                let message = message.unwrap_or_else(|| format!("has to be {}", display(&value)));
                Self::Accept(AcceptOptions { value, message })
            }
            "custom" => Self::Custom {
                description: match raw {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(opts) => opts
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                },
            },
            unknown => {
                tracing::warn!(kind = unknown, "ignoring unknown validator");
                return Ok(None);
            }
        };

        Ok(Some(validator))
    }

    /// Name of the validator kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Present(_) => "present",
            Self::Include(_) => "include",
            Self::Exclude(_) => "exclude",
            Self::Length(_) => "length",
            Self::Number(_) => "number",
            Self::Format(_) => "format",
            Self::Confirm(_) => "confirm",
            Self::Accept(_) => "accept",
            Self::Custom { .. } => "custom",
        }
    }

    /// Checks a coerced value.
    ///
    /// `input` holds every coerced parameter of the same call, which the
    /// `confirm` validator compares against. Returns the failure message, with
    /// placeholders substituted, or `None` if the value passes.
    pub fn check(&self, value: &Value, input: &Map<String, Value>) -> Option<String> {
        let failed = match self {
            Self::Present(opts) => match value {
                Value::Null => true,
                Value::String(s) => !opts.empty && s.trim().is_empty(),
                Value::Array(a) => !opts.empty && a.is_empty(),
                _ => false,
            },
            Self::Include(opts) => !opts.values.contains(value),
            Self::Exclude(opts) => opts.values.contains(value),
            Self::Length(opts) => {
                let len = length_of(value);
                opts.equals.is_some_and(|eq| len != eq)
                    || opts.min.is_some_and(|min| len < min)
                    || opts.max.is_some_and(|max| len > max)
            }
            Self::Number(opts) => match number_of(value) {
                None => true,
                Some(n) => {
                    opts.min.is_some_and(|min| n < min)
                        || opts.max.is_some_and(|max| n > max)
                        || opts
                            .step
                            .is_some_and(|step| !is_multiple(n - opts.min.unwrap_or(0.0), step))
                        || opts.modulo.is_some_and(|m| !is_multiple(n, m))
                        || (opts.odd && !is_multiple(n - 1.0, 2.0))
                        || (opts.even && !is_multiple(n, 2.0))
                }
            },
            Self::Format(opts) => opts.rx.is_match(&display(value)) != opts.matches,
            Self::Confirm(opts) => {
                let other = input.get(&opts.parameter).unwrap_or(&Value::Null);
                loosely_equal(value, other) != opts.equal
            }
            Self::Accept(opts) => !loosely_equal(value, &opts.value),
            Self::Custom { .. } => false,
        };

        failed.then(|| self.interpolate(value))
    }

    fn message(&self) -> &str {
        match self {
            Self::Present(o) => &o.message,
            Self::Include(o) | Self::Exclude(o) => &o.message,
            Self::Length(o) => &o.message,
            Self::Number(o) => &o.message,
            Self::Format(o) => &o.message,
            Self::Confirm(o) => &o.message,
            Self::Accept(o) => &o.message,
            Self::Custom { .. } => "",
        }
    }

    fn interpolate(&self, value: &Value) -> String {
        let mut vars: BTreeMap<&str, String> = BTreeMap::new();
        vars.insert("value", display(value));
        match self {
            Self::Length(o) => {
                insert_opt(&mut vars, "min", o.min);
                insert_opt(&mut vars, "max", o.max);
                insert_opt(&mut vars, "equals", o.equals);
            }
            Self::Number(o) => {
                insert_opt(&mut vars, "min", o.min);
                insert_opt(&mut vars, "max", o.max);
                insert_opt(&mut vars, "step", o.step);
                insert_opt(&mut vars, "mod", o.modulo);
            }
            Self::Confirm(o) => {
                vars.insert("parameter", o.parameter.clone());
            }
            _ => {}
        }

        let mut message = self.message().to_string();
        for (name, replacement) in vars {
            message = message.replace(&format!("%{{{name}}}"), &replacement);
        }
        message
    }
}

/// Ordered validators of one parameter.
///
/// Deserializes from the description's `{kind: options}` map, normalizing
/// every entry on the way in.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(try_from = "Option<BTreeMap<String, Value>>")]
pub struct Validators(Vec<Validator>);

impl Validators {
    /// Normalized validators.
    pub fn iter(&self) -> impl Iterator<Item = &Validator> {
        self.0.iter()
    }

    /// Returns `true` if no validator is declared.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Finds the validator of the given kind.
    pub fn get(&self, kind: &str) -> Option<&Validator> {
        self.0.iter().find(|v| v.kind() == kind)
    }

    /// Runs every validator and collects all failure messages.
    pub fn check(&self, value: &Value, input: &Map<String, Value>) -> Vec<String> {
        self.0.iter().filter_map(|v| v.check(value, input)).collect()
    }
}

impl TryFrom<Option<BTreeMap<String, Value>>> for Validators {
    type Error = SchemaError;

    fn try_from(raw: Option<BTreeMap<String, Value>>) -> Result<Self, Self::Error> {
        let mut validators = Vec::new();
        for (kind, options) in raw.unwrap_or_default() {
            if let Some(validator) = Validator::normalize(&kind, &options)? {
                validators.push(validator);
            }
        }
        Ok(Self(validators))
    }
}

impl FromIterator<Validator> for Validators {
    fn from_iter<I: IntoIterator<Item = Validator>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn unexpected(kind: &str, raw: &Value) -> SchemaError {
    SchemaError::invalid_validator(kind, format!("unexpected options {raw}"))
}

fn opt_message(opts: &Map<String, Value>) -> Option<String> {
    opts.get("message").and_then(Value::as_str).map(str::to_string)
}

fn opt_bool(opts: &Map<String, Value>, key: &str) -> Option<bool> {
    opts.get(key).and_then(Value::as_bool)
}

fn opt_f64(opts: &Map<String, Value>, key: &str) -> Option<f64> {
    opts.get(key).and_then(Value::as_f64)
}

fn opt_usize(opts: &Map<String, Value>, key: &str) -> Option<usize> {
    opts.get(key).and_then(Value::as_u64).map(|n| n as usize)
}

fn insert_opt<T: ToString>(vars: &mut BTreeMap<&'static str, String>, key: &'static str, v: Option<T>) {
    if let Some(v) = v {
        vars.insert(key, v.to_string());
    }
}

fn present_message(empty: bool) -> String {
    if empty {
        "must be present".to_string()
    } else {
        "must be present and non-empty".to_string()
    }
}

fn length_message(min: Option<usize>, max: Option<usize>, equals: Option<usize>) -> String {
    match (min, max, equals) {
        (_, _, Some(_)) => "length has to be %{equals}".to_string(),
        (Some(_), Some(_), None) => "length has to be in range <%{min}, %{max}>".to_string(),
        (Some(_), None, None) => "length has to be minimally %{min}".to_string(),
        (None, Some(_), None) => "length has to be maximally %{max}".to_string(),
        (None, None, None) => "length is invalid".to_string(),
    }
}

fn number_message(
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
    modulo: Option<f64>,
    odd: bool,
    even: bool,
) -> String {
    let mut parts = Vec::new();
    match (min, max) {
        (Some(_), Some(_)) => parts.push("in range <%{min}, %{max}>"),
        (Some(_), None) => parts.push("minimally %{min}"),
        (None, Some(_)) => parts.push("maximally %{max}"),
        (None, None) => {}
    }
    if step.is_some() {
        parts.push("in steps of %{step}");
    }
    if modulo.is_some() {
        parts.push("divisible by %{mod}");
    }
    if odd {
        parts.push("odd");
    }
    if even {
        parts.push("even");
    }
    if parts.is_empty() {
        "has to be a number".to_string()
    } else {
        format!("has to be {}", parts.join(", "))
    }
}

fn is_multiple(n: f64, of: f64) -> bool {
    let r = (n / of).round();
    (n - r * of).abs() < 1e-9
}

fn length_of(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Null => 0,
        other => other.to_string().chars().count(),
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a value the way messages and regex checks see it.
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Null, _) | (_, Value::Null) => false,
        _ => display(a) == display(b),
    }
}
