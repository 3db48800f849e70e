//! Native values the engine validates, converts and populates.
//!
//! Wire values arrive as `serde_json::Value`; deserialization turns strings
//! carrying a `date`, `date-time`, `byte` or `binary` format into their native
//! variants and serialization turns them back. Containers are `Arc`-shared and
//! never mutated in place, so a value frozen inside a compiled schema (enum
//! members, defaults, examples) can be handed out freely.
pub mod attributes;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde_json::Number;

pub use attributes::{Attributed, Attributes};

/// Insertion-ordered object body.
pub type Map = IndexMap<String, Value>;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Binary(Arc<[u8]>),
    Array(Arc<Vec<Value>>),
    Object(Arc<Map>),
    /// A value carrying out-of-band attributes; see [`attributes`].
    Attributed(Arc<Attributed>),
}

/// Stable identity used by the cycle guards.
///
/// Containers are identified by their shared allocation. Scalars cannot be
/// descended into, so every scalar frame on a recursion path refers to the
/// same scalar and they share a single identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Identity {
    Container(usize),
    Scalar,
}

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTION
// ————————————————————————————————————————————————————————————————————————————

impl Value {
    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(items))
    }

    pub fn object(map: Map) -> Self {
        Value::Object(Arc::new(map))
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Value::Binary(Arc::from(bytes.into()))
    }

    /// Build a number from an `f64`; non-finite input has no JSON form and
    /// becomes `Null`.
    pub fn from_f64(n: f64) -> Self {
        if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
            return Value::Number(Number::from(n as i64));
        }
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }

    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.clone()),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(xs) => Value::array(xs.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(m) => Value::object(
                m.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect()
            ),
        }
    }

    /// Render as JSON. Native variants use their wire encoding, so this is the
    /// same as serializing against a schema that declares the matching format.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => serde_json::Value::String(format_date(d)),
            Value::DateTime(dt) => serde_json::Value::String(format_date_time(dt)),
            Value::Binary(bytes) => serde_json::Value::String(Base64.encode(bytes)),
            Value::Array(xs) => serde_json::Value::Array(xs.iter().map(Value::to_json).collect()),
            Value::Object(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
            ),
            Value::Attributed(a) => a.value.to_json(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self { Value::Number(Number::from(n)) }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::String(s.to_string()) }
}

impl From<String> for Value {
    fn from(s: String) -> Self { Value::String(s) }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self { Value::Date(d) }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self { Value::DateTime(dt) }
}

// ————————————————————————————————————————————————————————————————————————————
// ACCESSORS
// ————————————————————————————————————————————————————————————————————————————

impl Value {
    /// Strip any attribute wrappers.
    pub fn inner(&self) -> &Value {
        match self {
            Value::Attributed(a) => a.value.inner(),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.inner(), Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.inner() {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.inner() {
            Value::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.inner() {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self.inner() {
            Value::Array(xs) => Some(xs),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self.inner() {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }

    /// Whether the value counts as "set" when used as a population condition.
    pub fn is_truthy(&self) -> bool {
        match self.inner() {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Short name of the value's shape, used in messages.
    pub fn kind(&self) -> &'static str {
        match self.inner() {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::DateTime(_) => "date-time",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Attributed(_) => unreachable!("inner() strips attribute wrappers"),
        }
    }

    pub fn identity(&self) -> Identity {
        match self.inner() {
            Value::Array(xs) => Identity::Container(Arc::as_ptr(xs) as usize),
            Value::Object(m) => Identity::Container(Arc::as_ptr(m) as usize),
            _ => Identity::Scalar,
        }
    }

    /// True when both values are the very same node: containers share an
    /// allocation, scalars are equal. Transforms use this to hand back the
    /// original container when nothing inside it changed.
    pub fn is_same_node(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Attributed(a), Value::Attributed(b)) => Arc::ptr_eq(a, b),
            (Value::Array(_) | Value::Object(_) | Value::Attributed(_), _)
            | (_, Value::Array(_) | Value::Object(_) | Value::Attributed(_)) => false,
            (a, b) => a == b,
        }
    }

    /// Order two values of the same comparable kind (numbers, dates,
    /// date-times). Anything else is unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self.inner(), other.inner()) {
            (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::DateTime(b)) => Some(date_start(a).cmp(b)),
            (Value::DateTime(a), Value::Date(b)) => Some(a.cmp(&date_start(b))),
            _ => None,
        }
    }
}

fn date_start(d: &NaiveDate) -> DateTime<Utc> {
    d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

pub(crate) fn format_date(d: &NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_date_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ————————————————————————————————————————————————————————————————————————————
// EQUALITY & DISPLAY
// ————————————————————————————————————————————————————————————————————————————

/// Deep equality. Attributes are ignored and numbers compare by value, so
/// `1` equals `1.0`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self.inner(), other.inner()) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b) || a[..] == b[..],
            (Value::Object(a), Value::Object(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.len() == b.len()
                        && a.iter().all(|(k, v)| b.get(k).is_some_and(|w| v == w)))
            }
            _ => false,
        }
    }
}

/// Compact rendering used inside diagnostics: strings are quoted, native
/// values show their wire form, containers render as JSON.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner() {
            Value::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
            Value::Date(d) => f.write_str(&format_date(d)),
            Value::DateTime(dt) => f.write_str(&format_date_time(dt)),
            Value::Binary(bytes) => write!(f, "<binary {} bytes>", bytes.len()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_equality_ignores_number_representation_and_key_order() {
        let a = Value::from(json!({"x": 1, "y": [1.0, "a"]}));
        let b = Value::from(json!({"y": [1, "a"], "x": 1.0}));
        assert_eq!(a, b);
        assert_ne!(a, Value::from(json!({"x": 1})));
    }

    #[test]
    fn clones_share_container_identity() {
        let a = Value::from(json!([1, 2]));
        let b = a.clone();
        assert_eq!(a.identity(), b.identity());
        assert!(a.is_same_node(&b));
        let c = Value::from(json!([1, 2]));
        assert_ne!(a.identity(), c.identity());
        assert_eq!(Value::from(1).identity(), Identity::Scalar);
    }

    #[test]
    fn display_quotes_strings_only() {
        assert_eq!(Value::from("a\"b").to_string(), "\"a\\\"b\"");
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::from(json!({"a": null})).to_string(), "{\"a\":null}");
    }

    #[test]
    fn dates_compare_with_date_times() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2000, 1, 2).unwrap());
        let dt = Value::DateTime(date_start(&NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()));
        assert_eq!(d.compare(&dt), Some(Ordering::Greater));
        assert_eq!(d.compare(&Value::from(1)), None);
    }

    #[test]
    fn from_f64_prefers_integers_when_exact() {
        assert_eq!(Value::from_f64(12.0).to_json(), json!(12));
        assert_eq!(Value::from_f64(0.5).to_json(), json!(0.5));
        assert!(Value::from_f64(f64::NAN).is_null());
    }
}
