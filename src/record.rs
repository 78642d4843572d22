//! Structured events flowing through the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A scalar field value. Nested JSON never survives parsing as a structure;
/// parsers store its compact text as a `String` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Field map of one event. Ordered so that serialized output is stable.
pub type Fields = BTreeMap<String, Value>;

/// One parsed log line and its derived event time.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: Fields,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(fields: Fields, timestamp: DateTime<Utc>) -> Self {
        Self { fields, timestamp }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A record that survived sampling, ready for the event sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub fields: Fields,
    pub timestamp: DateTime<Utc>,
    /// Number of observed records this event stands for.
    pub sample_rate: u32,
}

impl Event {
    pub fn from_record(record: Record, sample_rate: u32) -> Self {
        Self {
            fields: record.fields,
            timestamp: record.timestamp,
            sample_rate,
        }
    }
}

/// One line of text read from a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// Display name of the source ("-" for stdin).
    pub source: String,
    pub text: String,
}
