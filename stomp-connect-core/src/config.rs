//! Configuration management for the connector.

use crate::codec::CodecKind;
use crate::retry::RetryPolicy;
use crate::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

/// Where built events are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// JSON lines on standard output
    #[default]
    Stdout,
    /// JSON documents published to a Danube topic
    Danube,
}

impl std::str::FromStr for OutputKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Ok(OutputKind::Stdout),
            "danube" => Ok(OutputKind::Danube),
            other => Err(ConnectorError::config(format!("unknown output: {}", other))),
        }
    }
}

/// Main configuration for the connector process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Connector name (must be unique)
    pub connector_name: String,

    /// Output selection
    #[serde(default)]
    pub output: OutputKind,

    /// Danube broker service URL
    #[serde(default = "default_danube_service_url")]
    pub danube_service_url: String,

    /// Danube topic events are published to
    #[serde(default)]
    pub destination_topic: Option<String>,

    /// Use reliable dispatch (WAL + Cloud persistence)
    #[serde(default = "default_true")]
    pub reliable_dispatch: bool,

    /// Fixed delay between broker connection attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Give up connecting after this many attempts (retry forever if unset)
    #[serde(default)]
    pub max_connect_attempts: Option<u32>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_danube_service_url() -> String {
    "http://localhost:6650".to_string()
}

fn default_true() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ConnectorConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CONNECTOR_NAME`: Required, unique connector name
    /// - `OUTPUT`: `stdout` or `danube` (default: stdout)
    /// - `DANUBE_SERVICE_URL`: Danube broker URL (default: http://localhost:6650)
    /// - `DANUBE_TOPIC`: Danube topic events are published to
    /// - `RELIABLE_DISPATCH`: Enable reliable dispatch (default: true)
    /// - `RECONNECT_DELAY_MS`: Delay between connection attempts (default: 2000)
    /// - `MAX_CONNECT_ATTEMPTS`: Attempt ceiling (default: unlimited)
    /// - `LOG_LEVEL`: Log level (default: info)
    pub fn from_env() -> ConnectorResult<Self> {
        let connector_name = env::var("CONNECTOR_NAME")
            .map_err(|_| ConnectorError::config("CONNECTOR_NAME is required"))?;

        let mut config = Self {
            connector_name,
            ..Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            ConnectorError::config(format!("Failed to parse config file {}: {}", path, e))
        })
    }

    /// Apply environment variable overrides to core configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("CONNECTOR_NAME") {
            self.connector_name = val;
        }
        if let Ok(val) = env::var("OUTPUT") {
            if let Ok(output) = val.parse() {
                self.output = output;
            }
        }
        if let Ok(val) = env::var("DANUBE_SERVICE_URL") {
            self.danube_service_url = val;
        }
        if let Ok(val) = env::var("DANUBE_TOPIC") {
            self.destination_topic = Some(val);
        }
        if let Ok(val) = env::var("RELIABLE_DISPATCH") {
            if let Ok(b) = val.parse() {
                self.reliable_dispatch = b;
            }
        }
        if let Ok(val) = env::var("RECONNECT_DELAY_MS") {
            if let Ok(n) = val.parse() {
                self.reconnect_delay_ms = n;
            }
        }
        if let Ok(val) = env::var("MAX_CONNECT_ATTEMPTS") {
            if let Ok(n) = val.parse() {
                self.max_connect_attempts = Some(n);
            }
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.connector_name.is_empty() {
            return Err(ConnectorError::config("connector_name cannot be empty"));
        }

        if self.max_connect_attempts == Some(0) {
            return Err(ConnectorError::config("max_connect_attempts must be > 0"));
        }

        if self.output == OutputKind::Danube {
            if self.danube_service_url.is_empty() {
                return Err(ConnectorError::config("danube_service_url cannot be empty"));
            }
            match &self.destination_topic {
                Some(topic) if !topic.is_empty() => {}
                _ => {
                    return Err(ConnectorError::config(
                        "destination_topic is required when output is danube",
                    ))
                }
            }
        }

        Ok(())
    }

    /// Retry policy used for broker connection attempts
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::forever(Duration::from_millis(self.reconnect_delay_ms))
            .with_max_attempts(self.max_connect_attempts)
    }
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            connector_name: "stomp-source".to_string(),
            output: OutputKind::Stdout,
            danube_service_url: default_danube_service_url(),
            destination_topic: None,
            reliable_dispatch: true,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_connect_attempts: None,
            log_level: default_log_level(),
        }
    }
}

/// STOMP broker and subscription settings
#[derive(Clone, Serialize, Deserialize)]
pub struct StompConfig {
    /// The address of the STOMP server
    #[serde(default = "default_host")]
    pub host: String,

    /// The port of the STOMP server
    #[serde(default = "default_port")]
    pub port: u16,

    /// The username to authenticate with
    #[serde(default)]
    pub user: String,

    /// The password to authenticate with
    #[serde(default)]
    pub password: String,

    /// The destination to read events from, e.g. `/topic/logstash`
    pub destination: String,

    /// Virtual host announced in the CONNECT frame
    #[serde(default)]
    pub vhost: Option<String>,

    /// Message headers copied into every event as fields
    #[serde(default)]
    pub headers: Vec<String>,

    /// Raise log verbosity
    #[serde(default)]
    pub debug: bool,

    /// Body codec
    #[serde(default)]
    pub codec: CodecKind,

    /// Value of the `type` field added to events that lack one
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,

    /// Tags appended to every event
    #[serde(default)]
    pub tags: Vec<String>,

    /// Fields added to every event that lacks them
    #[serde(default)]
    pub add_field: HashMap<String, String>,

    /// Timeout for the TCP connect, the handshake and subscription receipts
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Messages buffered between the socket reader and the subscription loop
    #[serde(default = "default_message_buffer")]
    pub message_buffer: usize,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    61613
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_message_buffer() -> usize {
    256
}

fn split_list(val: &str) -> Vec<String> {
    val.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl StompConfig {
    /// Settings for `destination` with every other option at its default
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: String::new(),
            password: String::new(),
            destination: destination.into(),
            vhost: None,
            headers: Vec::new(),
            debug: false,
            codec: CodecKind::default(),
            event_type: None,
            tags: Vec::new(),
            add_field: HashMap::new(),
            connect_timeout_secs: default_connect_timeout(),
            message_buffer: default_message_buffer(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STOMP_DESTINATION`: Required, destination to subscribe to
    /// - `STOMP_HOST`: Broker host (default: localhost)
    /// - `STOMP_PORT`: Broker port (default: 61613)
    /// - `STOMP_USER` / `STOMP_PASSWORD`: Credentials (default: empty)
    /// - `STOMP_VHOST`: Virtual host
    /// - `STOMP_HEADERS`: Comma-separated header names copied into events
    /// - `STOMP_DEBUG`: Raise log verbosity (default: false)
    /// - `STOMP_CODEC`: plain, line, json or json_lines (default: plain)
    /// - `STOMP_TYPE`, `STOMP_TAGS`, `STOMP_ADD_FIELD` (`k=v,k2=v2`)
    pub fn from_env() -> ConnectorResult<Self> {
        let destination = env::var("STOMP_DESTINATION")
            .map_err(|_| ConnectorError::config("STOMP_DESTINATION is required"))?;

        let mut config = Self::new(destination);
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to STOMP configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("STOMP_HOST") {
            self.host = val;
        }
        if let Ok(val) = env::var("STOMP_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = env::var("STOMP_USER") {
            self.user = val;
        }
        if let Ok(val) = env::var("STOMP_PASSWORD") {
            self.password = val;
        }
        if let Ok(val) = env::var("STOMP_DESTINATION") {
            self.destination = val;
        }
        if let Ok(val) = env::var("STOMP_VHOST") {
            self.vhost = Some(val);
        }
        if let Ok(val) = env::var("STOMP_HEADERS") {
            self.headers = split_list(&val);
        }
        if let Ok(val) = env::var("STOMP_DEBUG") {
            if let Ok(b) = val.parse() {
                self.debug = b;
            }
        }
        if let Ok(val) = env::var("STOMP_CODEC") {
            if let Ok(codec) = val.parse() {
                self.codec = codec;
            }
        }
        if let Ok(val) = env::var("STOMP_TYPE") {
            self.event_type = Some(val);
        }
        if let Ok(val) = env::var("STOMP_TAGS") {
            self.tags = split_list(&val);
        }
        if let Ok(val) = env::var("STOMP_ADD_FIELD") {
            self.add_field = split_list(&val)
                .into_iter()
                .filter_map(|pair| {
                    pair.split_once('=')
                        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                })
                .collect();
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.host.is_empty() {
            return Err(ConnectorError::config("host cannot be empty"));
        }

        if self.port == 0 {
            return Err(ConnectorError::config("port must be > 0"));
        }

        if self.destination.is_empty() {
            return Err(ConnectorError::config("destination cannot be empty"));
        }

        if self.headers.iter().any(|h| h.is_empty()) {
            return Err(ConnectorError::config("header names cannot be empty"));
        }

        if self.add_field.keys().any(|k| k.is_empty()) {
            return Err(ConnectorError::config("add_field names cannot be empty"));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConnectorError::config("connect_timeout_secs must be > 0"));
        }

        if self.message_buffer == 0 {
            return Err(ConnectorError::config("message_buffer must be > 0"));
        }

        Ok(())
    }

    /// Value of the STOMP `host` header: the vhost if set, else the server host
    pub fn host_header(&self) -> &str {
        self.vhost.as_deref().unwrap_or(&self.host)
    }

    /// `host:port` socket address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL for logs, credentials omitted
    pub fn stomp_url(&self) -> String {
        format!("stomp://{}:{}/{}", self.host, self.port, self.destination)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl fmt::Debug for StompConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StompConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("destination", &self.destination)
            .field("vhost", &self.vhost)
            .field("headers", &self.headers)
            .field("debug", &self.debug)
            .field("codec", &self.codec)
            .field("event_type", &self.event_type)
            .field("tags", &self.tags)
            .field("add_field", &self.add_field)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("message_buffer", &self.message_buffer)
            .finish()
    }
}
