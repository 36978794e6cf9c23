use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Error as _, Serialize, Serializer};

/// A property value attached to a tracked event.
///
/// Closed set of value shapes accepted by the Mixpanel ingestion API. Values
/// serialize structurally to JSON; `Date` encodes as an RFC 3339 string.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Date(DateTime<Utc>),
    Array(Vec<PropertyValue>),
    Object(HashMap<String, PropertyValue>),
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PropertyValue::String(value) => serializer.serialize_str(value),
            PropertyValue::Int(value) => serializer.serialize_i64(*value),
            // JSON has no representation for NaN or infinity; encoding them as
            // null would silently change the property's meaning.
            PropertyValue::Double(value) if !value.is_finite() => {
                Err(S::Error::custom("non-finite double is not a valid property"))
            }
            PropertyValue::Double(value) => serializer.serialize_f64(*value),
            PropertyValue::Bool(value) => serializer.serialize_bool(*value),
            PropertyValue::Date(value) => {
                serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            PropertyValue::Array(value) => value.serialize(serializer),
            PropertyValue::Object(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Self::from_json(value).map_err(D::Error::custom)
    }
}

impl PropertyValue {
    /// Decode a JSON value, resolving ambiguity in a fixed priority order:
    /// string, int, double, bool, array, map. A number that fits `i64` is
    /// always `Int`, never `Double`. Because string outranks date, an RFC 3339
    /// string decodes as `String`; `Date` is an encode-side refinement.
    fn from_json(value: serde_json::Value) -> Result<Self, String> {
        match value {
            serde_json::Value::String(value) => Ok(PropertyValue::String(value)),
            serde_json::Value::Number(value) => value
                .as_i64()
                .map(PropertyValue::Int)
                .or_else(|| value.as_f64().map(PropertyValue::Double))
                .ok_or_else(|| format!("unrepresentable number: {value}")),
            serde_json::Value::Bool(value) => Ok(PropertyValue::Bool(value)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyValue::Array),
            serde_json::Value::Object(entries) => entries
                .into_iter()
                .map(|(key, value)| Self::from_json(value).map(|value| (key, value)))
                .collect::<Result<HashMap<_, _>, _>>()
                .map(PropertyValue::Object),
            serde_json::Value::Null => Err("null is not a valid property".to_owned()),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(value) => f.write_str(value),
            PropertyValue::Int(value) => write!(f, "{value}"),
            PropertyValue::Double(value) => write!(f, "{value}"),
            PropertyValue::Bool(value) => write!(f, "{value}"),
            PropertyValue::Date(value) => {
                f.write_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            PropertyValue::Array(value) => write!(f, "{value:?}"),
            PropertyValue::Object(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value.into())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(value: Vec<PropertyValue>) -> Self {
        PropertyValue::Array(value)
    }
}

impl From<HashMap<String, PropertyValue>> for PropertyValue {
    fn from(value: HashMap<String, PropertyValue>) -> Self {
        PropertyValue::Object(value)
    }
}
