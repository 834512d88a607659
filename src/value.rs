//! Dynamic value model shared by every layer of the engine.
//!
//! Field storage, coercion, collections, and projections all traffic in
//! [`Value`]. The enum deliberately mirrors the JSON data model plus the
//! three shapes the engine adds on top: calendar dates, live records, and
//! live typed collections. `Null` doubles as the absence marker: unset
//! fields read as `Value::Null`, and assigning it clears a field.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::collection::TypedCollection;
use crate::record::Record;

/// A dynamically typed value held by a record field.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absent / cleared.
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    /// Plain ordered sequence (not bound to a field).
    Array(Vec<Value>),
    /// Plain ordered mapping (not governed by a schema).
    Object(IndexMap<String, Value>),
    /// Handle to a live record instance.
    Record(Record),
    /// Handle to a live typed collection.
    Collection(TypedCollection),
}

impl Value {
    /// Lower-case tag for diagnostics and rejection messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Record(_) => "record",
            Value::Collection(_) => "collection",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&TypedCollection> {
        match self {
            Value::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Recursively copies the value so the result shares no structure with
    /// the source. Records are rebuilt as fresh instances of the same
    /// model; collections detach into plain arrays.
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => {
                Value::Array(items.iter().map(Value::deep_clone).collect())
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.deep_clone()))
                    .collect(),
            ),
            Value::Record(record) => Value::Record(record.duplicate()),
            Value::Collection(collection) => Value::Array(
                collection
                    .values()
                    .iter()
                    .map(Value::deep_clone)
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Converts into `serde_json::Value`. JSON has no date type, so dates
    /// render as RFC 3339 strings when `date_to_iso` is set and as epoch
    /// milliseconds otherwise. Records render as their projection and
    /// collections as plain arrays.
    pub fn to_json_value(&self, date_to_iso: bool) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Date(d) => {
                if date_to_iso {
                    serde_json::Value::String(format_iso(d))
                } else {
                    serde_json::Value::Number(d.timestamp_millis().into())
                }
            }
            Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|v| v.to_json_value(date_to_iso)).collect(),
            ),
            Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json_value(date_to_iso)))
                    .collect(),
            ),
            Value::Record(record) => record.projection(None, false).to_json_value(date_to_iso),
            Value::Collection(collection) => serde_json::Value::Array(
                collection
                    .values()
                    .iter()
                    .map(|v| v.to_json_value(date_to_iso))
                    .collect(),
            ),
        }
    }
}

/// RFC 3339 with millisecond precision, the wire form produced everywhere
/// a date leaves the engine.
pub(crate) fn format_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 9_007_199_254_740_992.0 {
        serde_json::Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a.content_eq(b),
            (Value::Collection(a), Value::Collection(b)) => a.values() == b.values(),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", format_iso(d)),
            other => {
                let json = serde_json::to_string(&other.to_json_value(true))
                    .map_err(|_| fmt::Error)?;
                write!(f, "{}", json)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.is_finite() && n.abs() < 9_007_199_254_740_992.0 {
                    serializer.serialize_i64(*n as i64)
                } else {
                    serializer.serialize_f64(*n)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Date(d) => serializer.serialize_str(&format_iso(d)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            Value::Record(record) => record.projection(None, false).serialize(serializer),
            Value::Collection(collection) => {
                let values = collection.values();
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for item in &values {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

// ==================
// Conversions
// ==================

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Value {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Value {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Value {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Value {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Value {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Value {
        Value::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Value {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Value {
        Value::Object(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Value {
        Value::Record(record)
    }
}

impl From<TypedCollection> for Value {
    fn from(collection: TypedCollection) -> Value {
        Value::Collection(collection)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Value {
        match opt {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> serde_json::Value {
        value.to_json_value(true)
    }
}
