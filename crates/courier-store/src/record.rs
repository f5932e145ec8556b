//! Wire record format.
//!
//! The backend stores flat string-keyed JSON maps. Models are converted with
//! serde, so timestamps travel as RFC 3339 strings and sets as arrays.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

/// A single stored record.
pub type Record = serde_json::Map<String, Value>;

/// Encode a model as a record. Fails if the value does not serialize to an object.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Codec(format!(
            "expected an object, got {}",
            kind_of(&other)
        ))),
    }
}

/// Decode a record into a model.
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(record))?)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// What happened to a child record under a subscribed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordEventKind {
    Added,
    Changed,
    Removed,
}

/// Push notification for one direct child of a subscribed path.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEvent {
    pub key: String,
    pub kind: RecordEventKind,
    /// Current contents; `None` for [`RecordEventKind::Removed`].
    pub record: Option<Record>,
}
