//! Field-name translation between local and remote conventions.
//!
//! Only top-level keys are translated; nested values are opaque column
//! contents on the remote side.

use crate::{error::Result, Record};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Naming convention mapping applied to payload keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldNaming {
    /// Keys are sent unchanged
    Identity,
    /// Local `camelCase` keys map to remote `snake_case` keys (default)
    #[default]
    CamelToSnake,
}

impl FieldNaming {
    /// Translate a local key to the remote convention.
    pub fn to_remote(&self, key: &str) -> String {
        match self {
            FieldNaming::Identity => key.to_string(),
            FieldNaming::CamelToSnake => camel_to_snake(key),
        }
    }

    /// Translate a remote key to the local convention.
    pub fn to_local(&self, key: &str) -> String {
        match self {
            FieldNaming::Identity => key.to_string(),
            FieldNaming::CamelToSnake => snake_to_camel(key),
        }
    }

    /// Produce the remote JSON object for a record.
    pub fn record_to_remote(&self, record: &Record) -> Value {
        let map: Map<String, Value> = record
            .as_map()
            .iter()
            .map(|(k, v)| (self.to_remote(k), v.clone()))
            .collect();
        Value::Object(map)
    }

    /// Rebuild a local record from a remote JSON object.
    pub fn record_from_remote(&self, value: Value) -> Result<Record> {
        let translated = match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (self.to_local(&k), v))
                    .collect(),
            ),
            other => other,
        };
        Record::from_value(translated)
    }
}

/// `lastUpdated` → `last_updated`.
pub fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `last_updated` → `lastUpdated`.
pub fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}
