//! Error types for the connector runtime.

use thiserror::Error;

/// Boxed source error carried by connectivity and fatal failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for connector operations
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Errors raised by the connector core and its collaborators
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// The broker could not be reached or the connection broke
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A broker round-trip did not complete in time
    #[error("timeout: {0}")]
    Timeout(String),

    /// A message payload could not be decoded
    #[error("invalid data: {message}")]
    InvalidData { message: String, payload: Vec<u8> },

    /// An event could not be serialized for output
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unrecoverable failure
    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A bounded retry policy gave up
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last_error: Box<ConnectorError>,
    },

    /// Shutdown was requested while an operation was pending
    #[error("shutdown requested")]
    Shutdown,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectorError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping its cause
    pub fn connection_with_source<E>(msg: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid data error for an undecodable payload
    pub fn invalid_data(msg: impl Into<String>, payload: &[u8]) -> Self {
        Self::InvalidData {
            message: msg.into(),
            payload: payload.to_vec(),
        }
    }

    /// Create a fatal error
    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a fatal error wrapping its cause
    pub fn fatal_with_source<E>(msg: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Fatal {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap the last failure of a bounded retry loop
    pub fn retries_exhausted(attempts: u32, last_error: ConnectorError) -> Self {
        Self::RetriesExhausted {
            attempts,
            last_error: Box::new(last_error),
        }
    }

    /// Check if the failure is transient and may succeed on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout(_) | Self::Io(_)
        )
    }

    /// Check if the failure was caused by a malformed payload
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::InvalidData { .. })
    }

    /// Check if this error only signals a requested shutdown
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
