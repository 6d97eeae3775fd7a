//! Inbound broker messages.

use std::collections::HashMap;

/// One delivery from the broker: an opaque body plus its headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// The message body
    pub body: Vec<u8>,
    /// Message headers, keys unique
    pub headers: HashMap<String, String>,
}

impl RawMessage {
    /// Create a message with a body and no headers
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Add a header (builder pattern)
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Get the body as bytes
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Get the body size in bytes
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Get a specific header value
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(|s| s.as_str())
    }

    /// Broker-assigned message id, if the broker sent one
    pub fn message_id(&self) -> Option<&str> {
        self.header("message-id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_message_builder() {
        let msg = RawMessage::new("hello world")
            .with_header("message-id", "136")
            .with_header("type", "messageType1");

        assert_eq!(msg.body(), b"hello world");
        assert_eq!(msg.size(), 11);
        assert_eq!(msg.message_id(), Some("136"));
        assert_eq!(msg.header("type"), Some("messageType1"));
    }
}
