//! Application configuration for the room binaries
//!
//! Loaded from YAML, then overridden from the environment, then validated.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use wsrooms::ManagerConfig;

/// Overrides `endpoint` when set
pub const ENDPOINT_ENV: &str = "WSROOMS_ENDPOINT";

/// Overrides `bind_addr` when set
pub const BIND_ADDR_ENV: &str = "WSROOMS_BIND_ADDR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Shared configuration for `room_server` and `room_client`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// WebSocket URL the client dials
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Address the server listens on
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Room used when a client connects to `/`
    #[serde(default = "default_room")]
    pub default_room: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Connection manager tunables
    #[serde(default)]
    pub connection: ManagerConfig,

    /// Environment variables that replaced file values, reported by `log()`
    #[serde(skip)]
    pub env_overrides: Vec<&'static str>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:9000/lobby".to_string()
}

fn default_bind_addr() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_room() -> String {
    "lobby".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            bind_addr: default_bind_addr(),
            default_room: default_room(),
            log_level: default_log_level(),
            connection: ManagerConfig::default(),
            env_overrides: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    ///
    /// A missing file falls back to defaults so the binaries run out of the box.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();

        let mut config = if config_path.exists() {
            let yaml_content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&yaml_content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without touching the environment
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Runs before tracing is up, so overrides are recorded rather than logged
    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV) {
            self.endpoint = endpoint;
            self.env_overrides.push(ENDPOINT_ENV);
        }
        if let Ok(bind_addr) = std::env::var(BIND_ADDR_ENV) {
            self.bind_addr = bind_addr;
            self.env_overrides.push(BIND_ADDR_ENV);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "endpoint must be a ws:// or wss:// URL, got '{}'",
                self.endpoint
            )));
        }

        if self.bind_addr.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "bind_addr cannot be empty".to_string(),
            ));
        }

        if self.default_room.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_room cannot be empty".to_string(),
            ));
        }

        self.connection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Endpoint: {}", self.endpoint);
        info!("  Bind address: {}", self.bind_addr);
        info!("  Default room: {}", self.default_room);
        info!("  Retry delay: {:?}", self.connection.retry_delay);
        info!("  Verbose: {}", self.connection.verbose);
        info!("  Log level: {}", self.log_level);
        if !self.env_overrides.is_empty() {
            info!("  Overridden from environment: {}", self.env_overrides.join(", "));
        }
    }
}
