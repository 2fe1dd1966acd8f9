//! Type coercion of caller input.
//!
//! Coercion turns loosely typed input into the wire value a parameter's
//! declared type expects. It never looks at validators and never touches the
//! network.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

use crate::description::{ParameterDescriptor, ParameterType};
use crate::path::ResourcePath;

/// Reference to a materialized resource, passed where a resource parameter
/// is expected.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceReference {
    /// Path of the resource the instance belongs to.
    pub path: ResourcePath,
    /// The instance's id.
    pub id: Value,
}

/// A single input value as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// A JSON value.
    Json(Value),
    /// A native date and time.
    Datetime(DateTime<FixedOffset>),
    /// A resource instance standing in for its id.
    Resource(ResourceReference),
}

impl InputValue {
    /// Returns `true` for JSON null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Json(Value::Null))
    }

    /// Returns `true` for null and the empty string, both of which a nullable
    /// parameter accepts as null.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Json(Value::Null) => true,
            Self::Json(Value::String(s)) => s.is_empty(),
            _ => false,
        }
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Json(Value::String(value.to_string()))
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Json(Value::String(value))
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<i32> for InputValue {
    fn from(value: i32) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<u64> for InputValue {
    fn from(value: u64) -> Self {
        Self::Json(Value::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        // Non-finite floats have no JSON form; keep them as strings so the
        // coercer can reject them with a proper message.
        Self::Json(Number::from_f64(value).map_or_else(|| Value::String(value.to_string()), Value::Number))
    }
}

impl From<bool> for InputValue {
    fn from(value: bool) -> Self {
        Self::Json(Value::Bool(value))
    }
}

impl From<DateTime<FixedOffset>> for InputValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Datetime(value)
    }
}

impl From<DateTime<Utc>> for InputValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Datetime(value.fixed_offset())
    }
}

impl From<ResourceReference> for InputValue {
    fn from(value: ResourceReference) -> Self {
        Self::Resource(value)
    }
}

/// Coerces a value to the parameter's declared type.
///
/// Nullability and presence are the caller's concern (see
/// [`crate::input::prepare_input`]); this function only converts.
///
/// ## Errors
///
/// Returns a human readable message when the value cannot represent the
/// declared type.
pub fn coerce(param: &ParameterDescriptor, value: &InputValue) -> Result<Value, String> {
    match param.kind {
        ParameterType::Integer => coerce_integer(value),
        ParameterType::Float => coerce_float(value),
        ParameterType::Boolean => coerce_boolean(value),
        ParameterType::Datetime => coerce_datetime(value),
        ParameterType::String | ParameterType::Text => coerce_string(value),
        ParameterType::Resource => coerce_resource(param, value),
        ParameterType::Custom => Ok(match value {
            InputValue::Json(v) => v.clone(),
            InputValue::Datetime(dt) => Value::String(format_datetime(dt)),
            InputValue::Resource(r) => r.id.clone(),
        }),
    }
}

fn json(value: &InputValue) -> Option<&Value> {
    match value {
        InputValue::Json(v) => Some(v),
        _ => None,
    }
}

fn integral(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if let Some(u) = n.as_u64() {
        return i64::try_from(u).ok();
    }
    let f = n.as_f64()?;
    // `i64::MAX as f64` rounds up to 2^63, which is already out of range.
    (f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64)
        .then_some(f as i64)
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.strip_prefix('+').unwrap_or(s).parse().ok()
}

fn coerce_integer(value: &InputValue) -> Result<Value, String> {
    let int = match json(value) {
        Some(Value::Number(n)) => integral(n),
        Some(Value::String(s)) => parse_integer(s),
        _ => None,
    };
    int.map(Value::from)
        .ok_or_else(|| "not a valid integer".to_string())
}

fn coerce_float(value: &InputValue) -> Result<Value, String> {
    let float = match json(value) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| "not a valid float number".to_string())
}

fn coerce_boolean(value: &InputValue) -> Result<Value, String> {
    let parsed = match json(value) {
        Some(Value::Bool(b)) => Some(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "t" | "true" | "yes" | "y" | "1" => Some(true),
            "f" | "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed
        .map(Value::Bool)
        .ok_or_else(|| "not a valid boolean".to_string())
}

/// Parses an ISO-8601 date or date-time.
///
/// Accepted: RFC 3339 with offset, a date-time without offset (taken as
/// UTC), or a bare date (midnight UTC). Calendar validity is enforced by the
/// parser, so `2020-02-30` is rejected.
pub fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Serializes a date-time as ISO-8601 in UTC with a `Z` suffix.
pub fn format_datetime(dt: &DateTime<FixedOffset>) -> String {
    dt.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn coerce_datetime(value: &InputValue) -> Result<Value, String> {
    let dt = match value {
        InputValue::Datetime(dt) => Some(*dt),
        InputValue::Json(Value::String(s)) => parse_datetime(s),
        _ => None,
    };
    dt.map(|dt| Value::String(format_datetime(&dt)))
        .ok_or_else(|| "not in ISO 8601 format".to_string())
}

fn coerce_string(value: &InputValue) -> Result<Value, String> {
    match value {
        InputValue::Json(Value::String(s)) => Ok(Value::String(s.clone())),
        InputValue::Json(Value::Number(n)) => Ok(Value::String(n.to_string())),
        InputValue::Json(Value::Bool(b)) => Ok(Value::String(b.to_string())),
        InputValue::Datetime(dt) => Ok(Value::String(format_datetime(dt))),
        _ => Err("not a valid string".to_string()),
    }
}

fn coerce_resource(param: &ParameterDescriptor, value: &InputValue) -> Result<Value, String> {
    let id = match value {
        InputValue::Json(Value::Number(n)) => integral(n),
        InputValue::Json(Value::String(s)) => parse_integer(s),
        InputValue::Resource(reference) => {
            if let Some(target) = &param.association {
                if target.path != reference.path {
                    return Err(format!(
                        "expected an instance of {}, got {}",
                        target.path, reference.path
                    ));
                }
            }
            match &reference.id {
                Value::Number(n) => integral(n),
                Value::String(s) => parse_integer(s),
                _ => None,
            }
        }
        _ => None,
    };
    id.map(Value::from)
        .ok_or_else(|| "not a valid resource id".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn param(kind: ParameterType) -> ParameterDescriptor {
        ParameterDescriptor::new(kind)
    }

    fn coerce_json(kind: ParameterType, value: Value) -> Result<Value, String> {
        coerce(&param(kind), &InputValue::Json(value))
    }

    #[test]
    fn test_integer_accepts() {
        assert_eq!(coerce_json(ParameterType::Integer, json!(12)), Ok(json!(12)));
        assert_eq!(coerce_json(ParameterType::Integer, json!(12.0)), Ok(json!(12)));
        assert_eq!(coerce_json(ParameterType::Integer, json!(" -42 ")), Ok(json!(-42)));
        assert_eq!(coerce_json(ParameterType::Integer, json!("+7")), Ok(json!(7)));
    }

    #[test]
    fn test_integer_rejects() {
        assert!(coerce_json(ParameterType::Integer, json!(12.3)).is_err());
        assert!(coerce_json(ParameterType::Integer, json!("12a")).is_err());
        assert!(coerce_json(ParameterType::Integer, json!("1.0")).is_err());
        assert!(coerce_json(ParameterType::Integer, json!("")).is_err());
        assert!(coerce_json(ParameterType::Integer, json!("-")).is_err());
        assert!(coerce_json(ParameterType::Integer, json!(true)).is_err());
    }

    #[test]
    fn test_integer_out_of_range() {
        assert_eq!(coerce_json(ParameterType::Integer, json!(i64::MAX)), Ok(json!(i64::MAX)));
        assert!(coerce_json(ParameterType::Integer, json!(1u64 << 63)).is_err());
        assert_eq!(
            coerce_json(ParameterType::Integer, json!(u64::MAX)),
            Err("not a valid integer".to_string())
        );
        assert!(coerce_json(ParameterType::Integer, json!(9.3e18)).is_err());
        assert!(coerce_json(ParameterType::Integer, json!("9223372036854775808")).is_err());
    }

    #[test]
    fn test_float() {
        assert_eq!(coerce_json(ParameterType::Float, json!(1.5)), Ok(json!(1.5)));
        assert_eq!(coerce_json(ParameterType::Float, json!("1e3")), Ok(json!(1000.0)));
        assert_eq!(coerce_json(ParameterType::Float, json!(" 2.25 ")), Ok(json!(2.25)));
        assert!(coerce_json(ParameterType::Float, json!("NaN")).is_err());
        assert!(coerce_json(ParameterType::Float, json!("inf")).is_err());
        assert!(coerce_json(ParameterType::Float, json!("abc")).is_err());
        assert!(coerce(&param(ParameterType::Float), &InputValue::from(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_boolean_acceptance_set() {
        for truthy in [json!(true), json!(1), json!("true"), json!("T"), json!("yes"), json!("Y"), json!(" 1 ")] {
            assert_eq!(coerce_json(ParameterType::Boolean, truthy), Ok(json!(true)));
        }
        for falsy in [json!(false), json!(0), json!("FALSE"), json!("f"), json!("No"), json!("n"), json!("0")] {
            assert_eq!(coerce_json(ParameterType::Boolean, falsy), Ok(json!(false)));
        }
        for rejected in [json!(2), json!(-1), json!("maybe"), json!(""), json!([true])] {
            assert!(coerce_json(ParameterType::Boolean, rejected).is_err());
        }
    }

    #[test]
    fn test_datetime() {
        assert_eq!(
            coerce_json(ParameterType::Datetime, json!("2020-01-01T00:00:00Z")),
            Ok(json!("2020-01-01T00:00:00Z"))
        );
        assert_eq!(
            coerce_json(ParameterType::Datetime, json!("2020-01-01T02:00:00+02:00")),
            Ok(json!("2020-01-01T00:00:00Z"))
        );
        assert_eq!(
            coerce_json(ParameterType::Datetime, json!("2020-01-01")),
            Ok(json!("2020-01-01T00:00:00Z"))
        );
        assert!(coerce_json(ParameterType::Datetime, json!("2020-02-30")).is_err());
        assert!(coerce_json(ParameterType::Datetime, json!("2020-02-30T00:00:00Z")).is_err());
        assert!(coerce_json(ParameterType::Datetime, json!("yesterday")).is_err());
        assert!(coerce_json(ParameterType::Datetime, json!(1577836800)).is_err());
    }

    #[test]
    fn test_native_datetime() {
        let dt = Utc::now();
        let coerced = coerce(&param(ParameterType::Datetime), &InputValue::from(dt)).unwrap();
        let text = coerced.as_str().unwrap();
        assert!(text.ends_with('Z'));
        assert_eq!(parse_datetime(text).unwrap(), dt.fixed_offset());
    }

    #[test]
    fn test_string() {
        assert_eq!(coerce_json(ParameterType::String, json!("x")), Ok(json!("x")));
        assert_eq!(coerce_json(ParameterType::Text, json!(5)), Ok(json!("5")));
        assert_eq!(coerce_json(ParameterType::String, json!(false)), Ok(json!("false")));
        assert!(coerce_json(ParameterType::String, json!(["x"])).is_err());
        assert!(coerce_json(ParameterType::String, json!({"a": 1})).is_err());
    }

    #[test]
    fn test_resource_forms_agree() {
        let project = ParameterDescriptor::resource("project");
        let instance = InputValue::Resource(ResourceReference {
            path: ResourcePath::from("project"),
            id: json!(5),
        });

        let from_int = coerce(&project, &InputValue::from(5)).unwrap();
        let from_str = coerce(&project, &InputValue::from("5")).unwrap();
        let from_instance = coerce(&project, &instance).unwrap();

        assert_eq!(from_int, json!(5));
        assert_eq!(from_int, from_str);
        assert_eq!(from_int, from_instance);
    }

    #[test]
    fn test_resource_rejects() {
        let project = ParameterDescriptor::resource("project");
        assert!(coerce(&project, &InputValue::from("five")).is_err());
        assert!(coerce(&project, &InputValue::from(5.5)).is_err());

        let wrong_type = InputValue::Resource(ResourceReference {
            path: ResourcePath::from("user"),
            id: json!(5),
        });
        let err = coerce(&project, &wrong_type).unwrap_err();
        assert!(err.contains("expected an instance of project"));
    }

    #[test]
    fn test_custom_passes_through() {
        let value = json!({"nested": [1, 2]});
        assert_eq!(coerce_json(ParameterType::Custom, value.clone()), Ok(value));
    }

    fn recoerce(kind: ParameterType, value: Value) {
        if let Ok(first) = coerce_json(kind, value) {
            let second = coerce_json(kind, first.clone()).unwrap();
            assert_eq!(first, second);
        }
    }

    proptest! {
        #[test]
        fn prop_integer_recoercion_is_idempotent(n in any::<i64>()) {
            recoerce(ParameterType::Integer, json!(n));
            recoerce(ParameterType::Integer, json!(n.to_string()));
        }

        #[test]
        fn prop_float_recoercion_is_idempotent(f in -1.0e12f64..1.0e12) {
            recoerce(ParameterType::Float, json!(f));
            recoerce(ParameterType::Float, json!(f.to_string()));
        }

        #[test]
        fn prop_boolean_recoercion_is_idempotent(s in "(?i)(t|true|yes|y|1|f|false|no|n|0|x)") {
            recoerce(ParameterType::Boolean, json!(s));
        }

        #[test]
        fn prop_datetime_recoercion_is_idempotent(secs in 0i64..4_102_444_800) {
            let dt = DateTime::from_timestamp(secs, 0).unwrap();
            recoerce(ParameterType::Datetime, json!(dt.to_rfc3339()));
        }

        #[test]
        fn prop_string_recoercion_is_idempotent(s in ".*") {
            recoerce(ParameterType::String, json!(s));
        }
    }
}
