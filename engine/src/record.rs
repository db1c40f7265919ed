//! Record type for domain entities held in the local store.

use crate::{error::Result, Error, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field that carries a record's primary id.
pub const ID_FIELD: &str = "id";

/// A domain entity: a JSON object with a string `id`.
///
/// Records are stored and compared structurally, so a record read back from
/// the store is equal to the one that was written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Create a record from a JSON value, which must be an object whose `id`
    /// (if present) is a string or null.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => {
                let record = Self(map);
                record.validate_id()?;
                Ok(record)
            }
            other => Err(Error::InvalidRecord(format!(
                "expected an object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    fn validate_id(&self) -> Result<()> {
        match self.0.get(ID_FIELD) {
            None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
            Some(other) => Err(Error::InvalidRecord(format!(
                "id must be a string, got {}",
                json_type_name(other)
            ))),
        }
    }

    /// The record id, if assigned.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Return the record id, assigning one from `generate` when absent.
    pub fn ensure_id(&mut self, generate: impl FnOnce() -> RecordId) -> Result<RecordId> {
        self.validate_id()?;
        if let Some(id) = self.id() {
            return Ok(id.to_string());
        }
        let id = generate();
        self.0.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        Ok(id)
    }

    /// Get a top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a top-level field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Builder-style field setter.
    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.insert(field, value);
        self
    }

    /// The owning principal, read from `field`.
    pub fn principal_id(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into the underlying JSON object.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Record {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Record::from_value(value)
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_object() {
        let record = Record::from_value(json!({"id": "w-1", "userId": "u-1"})).unwrap();
        assert_eq!(record.id(), Some("w-1"));
        assert_eq!(record.principal_id("userId"), Some("u-1"));
    }

    #[test]
    fn rejects_non_objects() {
        let err = Record::from_value(json!([1, 2])).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidRecord("expected an object, got Array".into())
        );
    }

    #[test]
    fn rejects_numeric_id() {
        assert!(Record::from_value(json!({"id": 7})).is_err());
    }

    #[test]
    fn ensure_id_assigns_once() {
        let mut record = Record::new().with("name", json!("Squat day"));
        let id = record.ensure_id(|| "generated".to_string()).unwrap();
        assert_eq!(id, "generated");
        assert_eq!(record.id(), Some("generated"));

        let again = record.ensure_id(|| "other".to_string()).unwrap();
        assert_eq!(again, "generated");
    }

    #[test]
    fn ensure_id_replaces_null() {
        let mut record = Record::from_value(json!({"id": null})).unwrap();
        let id = record.ensure_id(|| "fresh".to_string()).unwrap();
        assert_eq!(id, "fresh");
    }

    #[test]
    fn serializes_transparently() {
        let record = Record::new().with("id", json!("a")).with("reps", json!(5));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"id": "a", "reps": 5}));
    }
}
