//! Pipeline metadata attached to every event.

use crate::config::StompConfig;
use crate::event::Event;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;

pub const TIMESTAMP_FIELD: &str = "@timestamp";
pub const VERSION_FIELD: &str = "@version";
pub const TYPE_FIELD: &str = "type";
pub const TAGS_FIELD: &str = "tags";

/// Schema version stamped on events
pub const EVENT_VERSION: &str = "1";

/// Mutates an event in place with pipeline-standard metadata
#[cfg_attr(test, mockall::automock)]
pub trait Decorator: Send + Sync {
    fn decorate(&self, event: &mut Event);
}

/// Adds ingestion timestamp, schema version, type, tags and static fields
///
/// Fields the codec already produced are left untouched, except `tags`,
/// which is extended.
#[derive(Debug, Clone, Default)]
pub struct PipelineDecorator {
    event_type: Option<String>,
    tags: Vec<String>,
    add_field: HashMap<String, String>,
}

impl PipelineDecorator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &StompConfig) -> Self {
        Self {
            event_type: config.event_type.clone(),
            tags: config.tags.clone(),
            add_field: config.add_field.clone(),
        }
    }

    pub fn with_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field.insert(key.into(), value.into());
        self
    }

    fn append_tags(&self, event: &mut Event) {
        if self.tags.is_empty() {
            return;
        }

        let mut tags = match event.remove(TAGS_FIELD) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => vec![other],
        };

        for tag in &self.tags {
            let tag = Value::from(tag.as_str());
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        event.set(TAGS_FIELD, tags);
    }
}

impl Decorator for PipelineDecorator {
    fn decorate(&self, event: &mut Event) {
        if !event.contains(TIMESTAMP_FIELD) {
            event.set(
                TIMESTAMP_FIELD,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }

        if !event.contains(VERSION_FIELD) {
            event.set(VERSION_FIELD, EVENT_VERSION);
        }

        if let Some(event_type) = &self.event_type {
            if !event.contains(TYPE_FIELD) {
                event.set(TYPE_FIELD, event_type.as_str());
            }
        }

        self.append_tags(event);

        for (key, value) in &self.add_field {
            if !event.contains(key) {
                event.set(key.as_str(), value.as_str());
            }
        }
    }
}
