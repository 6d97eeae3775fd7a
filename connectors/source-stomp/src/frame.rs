//! STOMP frames.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use stomp_connect_core::{ConnectorError, RawMessage};

/// Versions announced in the CONNECT frame
pub const ACCEPT_VERSION: &str = "1.0,1.1,1.2";

/// Frame commands, client and server side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped
    pub fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Stomp | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "CONNECTED" => Command::Connected,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => {
                return Err(ConnectorError::invalid_data(
                    format!("unknown stomp command: {}", other),
                    other.as_bytes(),
                ))
            }
        })
    }
}

/// One STOMP frame
///
/// Headers keep their wire order; repeated headers are kept and the first
/// occurrence wins on lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Add a header (builder pattern)
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// CONNECT frame; credentials are only sent when `login` is non-empty
    pub fn connect(host: &str, login: &str, passcode: &str) -> Self {
        let mut frame = Frame::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", "0,0");

        if !login.is_empty() {
            frame = frame
                .with_header("login", login)
                .with_header("passcode", passcode);
        }

        frame
    }

    pub fn subscribe(destination: &str, id: &str, receipt: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("destination", destination)
            .with_header("id", id)
            .with_header("ack", "auto")
            .with_header("receipt", receipt)
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect(receipt: &str) -> Self {
        Frame::new(Command::Disconnect).with_header("receipt", receipt)
    }

    /// First value of header `key`
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Error text of an ERROR frame: the `message` header, else the body
    pub fn error_message(&self) -> String {
        match self.header("message") {
            Some(message) => message.to_string(),
            None => String::from_utf8_lossy(&self.body).trim().to_string(),
        }
    }

    /// Convert a MESSAGE frame into the broker-neutral message type
    pub fn into_raw_message(self) -> RawMessage {
        let mut headers = HashMap::with_capacity(self.headers.len());
        for (key, value) in self.headers {
            headers.entry(key).or_insert(value);
        }

        RawMessage {
            body: self.body,
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_frame_credentials() {
        let anonymous = Frame::connect("localhost", "", "");
        assert_eq!(anonymous.header("accept-version"), Some(ACCEPT_VERSION));
        assert_eq!(anonymous.header("host"), Some("localhost"));
        assert_eq!(anonymous.header("login"), None);
        assert_eq!(anonymous.header("passcode"), None);

        let authenticated = Frame::connect("vhost-a", "guest", "secret");
        assert_eq!(authenticated.header("host"), Some("vhost-a"));
        assert_eq!(authenticated.header("login"), Some("guest"));
        assert_eq!(authenticated.header("passcode"), Some("secret"));
    }

    #[test]
    fn test_first_header_wins() {
        let frame = Frame::new(Command::Message)
            .with_header("type", "first")
            .with_header("type", "second")
            .with_body("payload");

        assert_eq!(frame.header("type"), Some("first"));

        let message = frame.into_raw_message();
        assert_eq!(message.header("type"), Some("first"));
        assert_eq!(message.body(), b"payload");
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("MESSAGE".parse::<Command>().unwrap(), Command::Message);
        assert_eq!(Command::Receipt.to_string(), "RECEIPT");
        assert!("message".parse::<Command>().is_err());
        assert!(!Command::Connected.escapes_headers());
        assert!(Command::Message.escapes_headers());
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        let with_header = Frame::new(Command::Error).with_header("message", "access refused");
        assert_eq!(with_header.error_message(), "access refused");

        let body_only = Frame::new(Command::Error).with_body("bad destination\n");
        assert_eq!(body_only.error_message(), "bad destination");
    }
}
