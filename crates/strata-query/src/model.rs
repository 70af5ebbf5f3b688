//! Result model - tag sets and result rows

use crate::error::QueryError;
use crate::statement::Expr;
use chrono::{DateTime, Utc};
use fxhash::FxHasher;
use serde::ser::Serializer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use strata_core::{FieldValue, RawPoint, SeriesId, Timestamp};

/// A distinct combination of tag values for a measurement, together with the
/// series that carry it.
///
/// The series id and filter sequences run in parallel: entry `i` of
/// `filters` is the per-series predicate (if any) for `series_ids[i]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    /// Tag key to tag value
    pub tags: BTreeMap<String, String>,
    /// Canonical lexicographic serialization of `tags`, used for ordering
    pub key: String,
    /// Per-series predicate expressions
    pub filters: Vec<Option<Expr>>,
    /// Series identifiers, parallel to `filters`
    pub series_ids: Vec<SeriesId>,
}

impl TagSet {
    /// Create a tag set, deriving its canonical key from the tags
    pub fn new(tags: BTreeMap<String, String>) -> Self {
        let key = tags
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        Self {
            tags,
            key,
            filters: Vec::new(),
            series_ids: Vec::new(),
        }
    }

    /// Associate a series and its filter with this tag set
    pub fn add_filter(&mut self, id: SeriesId, filter: Option<Expr>) {
        self.series_ids.push(id);
        self.filters.push(filter);
    }
}

/// A single result cell.
///
/// `Batch` is the raw reducer's intermediate output; the raw path unpacks
/// it into per-record rows, so it never appears in an emitted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// UTC wall-time representation of a bucket or record timestamp
    Time(DateTime<Utc>),
    /// 64-bit floating point
    Float(f64),
    /// 64-bit signed integer
    Integer(i64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// Time-ordered raw records
    Batch(Vec<RawPoint>),
    /// No value
    Null,
}

impl Value {
    /// The UTC wall-time value for a nanosecond epoch timestamp
    pub fn time(ns: Timestamp) -> Self {
        Value::Time(DateTime::from_timestamp_nanos(ns))
    }
}

impl From<FieldValue> for Value {
    fn from(v: FieldValue) -> Self {
        match v {
            FieldValue::Float(f) => Value::Float(f),
            FieldValue::Integer(i) => Value::Integer(i),
            FieldValue::String(s) => Value::String(s),
            FieldValue::Boolean(b) => Value::Boolean(b),
        }
    }
}

/// A single row returned from the execution of a statement. Each job emits
/// exactly one row: one value row per time bucket, one column per aggregate
/// plus the leading time column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_err")]
    pub err: Option<QueryError>,
}

fn serialize_err<S: Serializer>(err: &Option<QueryError>, serializer: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => serializer.serialize_str(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl Row {
    /// A row reporting a failed job
    pub fn error(name: impl Into<String>, tags: BTreeMap<String, String>, err: QueryError) -> Self {
        Self {
            name: name.into(),
            tags,
            columns: Vec::new(),
            values: Vec::new(),
            err: Some(err),
        }
    }

    /// Hash of the tag key/value pairs, in key order
    pub fn tags_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        for (k, v) in &self.tags {
            k.hash(&mut hasher);
            v.hash(&mut hasher);
        }
        hasher.finish()
    }
}

/// Sort rows by measurement name, then by tag set hash. Tags have no
/// meaningful sort order, so the hash stands in to give callers a
/// predictable ordering for collected result sets.
pub fn sort_rows(rows: &mut [Row]) {
    rows.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.tags_hash().cmp(&b.tags_hash()))
    });
}
