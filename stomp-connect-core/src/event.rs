//! Structured events handed to the output sink.

use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the decoded text of a message body
pub const MESSAGE_FIELD: &str = "message";

/// A structured record: field name to JSON value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event {
    fields: Map<String, Value>,
}

impl Event {
    /// Create an empty event
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an event whose `message` field holds `text`
    pub fn from_message(text: impl Into<String>) -> Self {
        let mut event = Self::new();
        event.set(MESSAGE_FIELD, text.into());
        event
    }

    /// Create an event from an existing JSON object
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Get a field as a string slice (if it is a JSON string)
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.fields.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names present on the event
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Serialize the event as a JSON document
    pub fn to_json_vec(&self) -> ConnectorResult<Vec<u8>> {
        serde_json::to_vec(&self.fields).map_err(|e| ConnectorError::Serialization(e.to_string()))
    }
}
