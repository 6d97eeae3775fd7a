//! Message to event transformation.

use crate::codec::Codec;
use crate::config::StompConfig;
use crate::decorate::{Decorator, PipelineDecorator};
use crate::event::Event;
use crate::message::RawMessage;
use crate::ConnectorResult;
use std::sync::Arc;

/// Builds events from raw broker messages
///
/// Each message body is decoded by the configured codec; every resulting event
/// is decorated and then receives the configured headers that are present on
/// the message. Decode failures are returned to the caller untouched.
#[derive(Clone)]
pub struct EventBuilder {
    codec: Arc<dyn Codec>,
    decorator: Arc<dyn Decorator>,
    headers: Vec<String>,
}

impl EventBuilder {
    pub fn new(codec: Arc<dyn Codec>, decorator: Arc<dyn Decorator>, headers: Vec<String>) -> Self {
        Self {
            codec,
            decorator,
            headers,
        }
    }

    /// Codec, decorator and header projection taken from configuration
    pub fn from_config(config: &StompConfig) -> Self {
        Self::new(
            config.codec.build(),
            Arc::new(PipelineDecorator::from_config(config)),
            config.headers.clone(),
        )
    }

    /// Header names projected into events
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn codec_name(&self) -> &'static str {
        self.codec.name()
    }

    /// Turn one message into zero or more events
    pub fn build(&self, message: &RawMessage) -> ConnectorResult<Vec<Event>> {
        let mut events = self.codec.decode(message.body())?;

        for event in &mut events {
            self.decorator.decorate(event);
            self.project_headers(event, message);
        }

        Ok(events)
    }

    fn project_headers(&self, event: &mut Event, message: &RawMessage) {
        for name in &self.headers {
            if let Some(value) = message.header(name) {
                event.set(name.as_str(), value);
            }
        }
    }
}

impl std::fmt::Debug for EventBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuilder")
            .field("codec", &self.codec.name())
            .field("headers", &self.headers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{LineCodec, MockCodec, PlainCodec};
    use crate::decorate::MockDecorator;
    use crate::ConnectorError;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn plain_builder(names: &[&str]) -> EventBuilder {
        EventBuilder::new(
            Arc::new(PlainCodec),
            Arc::new(PipelineDecorator::new()),
            headers(names),
        )
    }

    #[test]
    fn test_build_projects_configured_headers() {
        let builder = plain_builder(&["message-id", "type"]);
        let message = RawMessage::new("hello world")
            .with_header("message-id", "136")
            .with_header("type", "messageType1")
            .with_header("x-other", "ignored");

        let events = builder.build(&message).unwrap();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.get_str("message"), Some("hello world"));
        assert_eq!(event.get_str("message-id"), Some("136"));
        assert_eq!(event.get_str("type"), Some("messageType1"));
        assert!(!event.contains("x-other"));
        assert_eq!(event.get_str("@version"), Some("1"));
    }

    #[test]
    fn test_absent_headers_are_omitted() {
        let builder = plain_builder(&["message-id", "correlation-id"]);
        let message = RawMessage::new("body").with_header("message-id", "7");

        let event = builder.build(&message).unwrap().remove(0);
        assert_eq!(event.get_str("message-id"), Some("7"));
        assert!(!event.contains("correlation-id"));
    }

    #[test]
    fn test_empty_header_value_is_still_projected() {
        let builder = plain_builder(&["type"]);
        let message = RawMessage::new("body").with_header("type", "");

        let event = builder.build(&message).unwrap().remove(0);
        assert_eq!(event.get_str("type"), Some(""));
    }

    #[test]
    fn test_only_configured_headers_appear() {
        let configured = ["a", "b", "c"];
        let present = [("b", "2"), ("c", "3"), ("d", "4")];

        let mut decorator = MockDecorator::new();
        decorator.expect_decorate().return_const(());

        let builder = EventBuilder::new(
            Arc::new(PlainCodec),
            Arc::new(decorator),
            headers(&configured),
        );

        let mut message = RawMessage::new("x");
        for (k, v) in present {
            message = message.with_header(k, v);
        }

        let event = builder.build(&message).unwrap().remove(0);
        let mut keys: Vec<_> = event.keys().filter(|k| *k != "message").collect();
        keys.sort();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[test]
    fn test_each_event_is_decorated_and_projected() {
        let mut decorator = MockDecorator::new();
        decorator
            .expect_decorate()
            .times(3)
            .returning(|event| event.set("decorated", true));

        let builder = EventBuilder::new(
            Arc::new(LineCodec),
            Arc::new(decorator),
            headers(&["message-id"]),
        );
        let message = RawMessage::new("a\nb\nc\n").with_header("message-id", "9");

        let mut events = builder.build(&message).unwrap();
        assert_eq!(events.len(), 3);
        for event in &events {
            assert_eq!(event.get("decorated"), Some(&serde_json::Value::Bool(true)));
            assert_eq!(event.get_str("message-id"), Some("9"));
        }

        // Mutating one event does not leak into its siblings
        events[0].set("message-id", "changed");
        assert_eq!(events[1].get_str("message-id"), Some("9"));
    }

    #[test]
    fn test_zero_events_skip_decoration() {
        let mut decorator = MockDecorator::new();
        decorator.expect_decorate().never();

        let builder = EventBuilder::new(Arc::new(LineCodec), Arc::new(decorator), Vec::new());
        assert!(builder.build(&RawMessage::new("")).unwrap().is_empty());
    }

    #[test]
    fn test_decode_error_propagates() {
        let mut codec = MockCodec::new();
        codec
            .expect_decode()
            .times(1)
            .returning(|body| Err(ConnectorError::invalid_data("malformed", body)));

        let builder = EventBuilder::new(
            Arc::new(codec),
            Arc::new(PipelineDecorator::new()),
            Vec::new(),
        );

        let err = builder.build(&RawMessage::new("{oops")).unwrap_err();
        assert!(err.is_invalid_data());
    }
}
