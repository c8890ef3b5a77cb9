//! Conversion of upstream field mappings into JSON-safe records.
//!
//! Upstream objects arrive as a [`Fields`] map whose values may be
//! timestamps, references to named objects (authors, subreddits), opaque
//! extension values or callables. [`serialize_fields`] flattens them so the
//! result can always be written with `serde_json`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};

use crate::constants::RECORD_TIME_FORMAT;

/// Field name to value mapping of a single upstream object.
pub type Fields = BTreeMap<String, FieldValue>;

/// A full, JSON-safe record as written to the JSON archive.
pub type FullRecord = Map<String, Value>;

/// A value as exposed by the upstream API before serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// A reference to an object identified by a human readable name.
    /// `None` when the object was deleted or is anonymous.
    Named(Option<String>),
    List(Vec<FieldValue>),
    Map(Fields),
    /// Any other object; only its string representation survives.
    Opaque(String),
    /// A method or other callable attribute. Never serialized.
    Callable,
}

impl FieldValue {
    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Callable)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Format a timestamp the way every archived record stores it.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(RECORD_TIME_FORMAT).to_string()
}

/// Serialize an upstream field mapping into a JSON-safe record.
///
/// Callable fields are dropped, including inside nested maps and lists.
/// This never fails.
#[must_use]
pub fn serialize_fields(fields: &Fields) -> FullRecord {
    fields
        .iter()
        .filter(|(_, v)| !v.is_callable())
        .map(|(k, v)| (k.clone(), serialize_value(v)))
        .collect()
}

/// Serialize a single value.
#[must_use]
pub fn serialize_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null | FieldValue::Named(None) | FieldValue::Callable => Value::Null,
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Int(i) => Value::Number((*i).into()),
        // NaN and infinities have no JSON number form
        FieldValue::Float(f) => {
            Number::from_f64(*f).map_or_else(|| Value::String(f.to_string()), Value::Number)
        }
        FieldValue::Text(s) | FieldValue::Named(Some(s)) | FieldValue::Opaque(s) => {
            Value::String(s.clone())
        }
        FieldValue::Timestamp(ts) => Value::String(format_timestamp(ts)),
        FieldValue::List(items) => Value::Array(
            items
                .iter()
                .filter(|v| !v.is_callable())
                .map(serialize_value)
                .collect(),
        ),
        FieldValue::Map(fields) => Value::Object(serialize_fields(fields)),
    }
}
