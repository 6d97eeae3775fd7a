//! Body codecs: turn a raw message body into zero or more events.

use crate::event::Event;
use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Decodes message bodies into events
///
/// A codec may yield any number of events for one body, including none.
/// Malformed input is reported as [`ConnectorError::InvalidData`].
#[cfg_attr(test, mockall::automock)]
pub trait Codec: Send + Sync {
    /// Decode one message body
    fn decode(&self, body: &[u8]) -> ConnectorResult<Vec<Event>>;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}

/// Codec selection in configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Whole body as the `message` field
    #[default]
    Plain,
    /// One event per line
    Line,
    /// A JSON object, or an array of objects
    Json,
    /// One JSON object per line
    JsonLines,
}

impl CodecKind {
    /// Instantiate the selected codec
    pub fn build(self) -> Arc<dyn Codec> {
        match self {
            CodecKind::Plain => Arc::new(PlainCodec),
            CodecKind::Line => Arc::new(LineCodec),
            CodecKind::Json => Arc::new(JsonCodec),
            CodecKind::JsonLines => Arc::new(JsonLinesCodec),
        }
    }
}

impl std::str::FromStr for CodecKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(CodecKind::Plain),
            "line" => Ok(CodecKind::Line),
            "json" => Ok(CodecKind::Json),
            "json_lines" | "jsonlines" => Ok(CodecKind::JsonLines),
            other => Err(ConnectorError::config(format!("unknown codec: {}", other))),
        }
    }
}

/// Emits exactly one event per body; invalid UTF-8 is replaced
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainCodec;

impl Codec for PlainCodec {
    fn decode(&self, body: &[u8]) -> ConnectorResult<Vec<Event>> {
        Ok(vec![Event::from_message(String::from_utf8_lossy(body))])
    }

    fn name(&self) -> &'static str {
        "plain"
    }
}

/// Emits one event per `\n`-terminated line
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl Codec for LineCodec {
    fn decode(&self, body: &[u8]) -> ConnectorResult<Vec<Event>> {
        let text = String::from_utf8_lossy(body);
        Ok(split_lines(&text).map(Event::from_message).collect())
    }

    fn name(&self) -> &'static str {
        "line"
    }
}

/// Parses the body as a JSON object or an array of objects
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, body: &[u8]) -> ConnectorResult<Vec<Event>> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_slice(body).map_err(|e| {
            ConnectorError::invalid_data(format!("Failed to parse JSON body: {}", e), body)
        })?;

        match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| json_to_event(item, body))
                .collect(),
            other => Ok(vec![json_to_event(other, body)?]),
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Parses every non-empty line as a JSON object
///
/// A single bad line rejects the whole body.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLinesCodec;

impl Codec for JsonLinesCodec {
    fn decode(&self, body: &[u8]) -> ConnectorResult<Vec<Event>> {
        let text = std::str::from_utf8(body).map_err(|e| {
            ConnectorError::invalid_data(format!("Body is not valid UTF-8: {}", e), body)
        })?;

        split_lines(text)
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                let value: Value = serde_json::from_str(line).map_err(|e| {
                    ConnectorError::invalid_data(
                        format!("Failed to parse JSON on line {}: {}", idx + 1, e),
                        body,
                    )
                })?;
                json_to_event(value, body)
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "json_lines"
    }
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let empty = text.is_empty();
    text.strip_suffix('\n')
        .unwrap_or(text)
        .split('\n')
        .filter(move |_| !empty)
}

fn json_to_event(value: Value, body: &[u8]) -> ConnectorResult<Event> {
    match value {
        Value::Object(fields) => Ok(Event::from_fields(fields)),
        other => Err(ConnectorError::invalid_data(
            format!("Expected a JSON object, got {}", json_type(&other)),
            body,
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
