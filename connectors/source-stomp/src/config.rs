//! Configuration for the STOMP Source Connector

use serde::{Deserialize, Serialize};
use std::env;
use stomp_connect_core::{ConnectorConfig, ConnectorError, ConnectorResult, StompConfig};

/// Unified configuration for the STOMP Source Connector
///
/// Core connector settings live at the root of the file, broker and
/// subscription settings under `[stomp]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StompSourceConfig {
    /// Core connector configuration (flattened at root level)
    #[serde(flatten)]
    pub core: ConnectorConfig,

    /// STOMP-specific configuration
    pub stomp: StompConfig,
}

impl StompSourceConfig {
    /// Load configuration from a single TOML file with optional ENV overrides
    ///
    /// Priority: TOML file → Environment variables
    ///
    /// # Example
    ///
    /// ```toml
    /// connector_name = "stomp-source"
    /// output = "stdout"
    ///
    /// [stomp]
    /// host = "activemq"
    /// destination = "/topic/logstash"
    /// headers = ["message-id", "type"]
    /// ```
    pub fn load() -> ConnectorResult<Self> {
        let mut config = if let Ok(config_file) = env::var("CONFIG_FILE") {
            Self::from_file(&config_file)?
        } else {
            Self::from_env()?
        };

        config.core.apply_env_overrides();
        config.stomp.apply_env_overrides();

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> ConnectorResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::config(format!("Failed to read config file {}: {}", path, e))
        })?;

        Self::from_toml(&content)
            .map_err(|e| ConnectorError::config(format!("Failed to parse config file {}: {}", path, e)))
    }

    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> ConnectorResult<Self> {
        Ok(Self {
            core: ConnectorConfig::from_env()?,
            stomp: StompConfig::from_env()?,
        })
    }

    /// Validate all configuration
    pub fn validate(&self) -> ConnectorResult<()> {
        self.core.validate()?;
        self.stomp.validate()?;
        Ok(())
    }
}
