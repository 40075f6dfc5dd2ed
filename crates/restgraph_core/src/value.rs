//! Typed attribute values.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};

/// A typed attribute value held by a cached node.
///
/// Values arrive as untyped JSON. Dates are the only kind the translator
/// converts explicitly; everything else keeps its natural JSON shape, with
/// nested arrays and objects carried verbatim as `Json`.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// Explicit null.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number (also used for integers outside the i64 range).
    Float(f64),
    /// UTF-8 text.
    String(String),
    /// Timestamp.
    Date(DateTime<Utc>),
    /// Nested array or object.
    Json(Value),
}

impl AttributeValue {
    /// Converts a wire value without any schema knowledge.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::Json(value.clone()),
        }
    }

    /// Renders the value for the wire. Dates become RFC 3339 strings.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            Self::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.clone()),
            Self::Date(d) => Value::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Json(v) => v.clone(),
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp if this is a date.
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}
