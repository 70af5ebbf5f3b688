//! Core data types for the Strata time series database

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Unique identifier for a time series (hash of measurement + sorted tags)
pub type SeriesId = u64;

/// Field value types supported by the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
}

impl FieldValue {
    /// Get the type name of this field value
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Float(_) => "float",
            FieldValue::Integer(_) => "integer",
            FieldValue::String(_) => "string",
            FieldValue::Boolean(_) => "boolean",
        }
    }

    /// Try to convert to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Try to convert to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            FieldValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Boolean(v)
    }
}

/// The payload of one raw query record: a bare value when a single field was
/// selected, or a field map otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointPayload {
    /// A single field value
    Value(FieldValue),
    /// A map of field name to value
    Fields(BTreeMap<String, FieldValue>),
}

impl PointPayload {
    /// Look up a field by name. A bare value has no named fields.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        match self {
            PointPayload::Value(_) => None,
            PointPayload::Fields(fields) => fields.get(name),
        }
    }
}

/// One record produced by a raw (non-aggregate) query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Nanosecond epoch timestamp of the record
    pub timestamp: Timestamp,
    /// The record's value or field map
    pub payload: PointPayload,
}

impl RawPoint {
    /// Create a record carrying a single value
    pub fn value(timestamp: Timestamp, value: impl Into<FieldValue>) -> Self {
        Self {
            timestamp,
            payload: PointPayload::Value(value.into()),
        }
    }

    /// Create a record carrying a field map
    pub fn fields(timestamp: Timestamp, fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            timestamp,
            payload: PointPayload::Fields(fields),
        }
    }
}
