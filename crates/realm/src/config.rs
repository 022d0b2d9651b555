//! Configuration management for the realm server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use crate::cli::CliArgs;
use realm_protocol::{opcodes::CURRENT_REVISION, MAX_PAYLOAD_LEN};
use realm_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    #[serde(default)]
    pub server: ServerSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Network, session and world settings.
///
/// Every field except the bind address may be left out of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Network address to bind the server to (e.g., "127.0.0.1:1239")
    pub bind_address: String,
    /// Maximum number of concurrent client connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest frame payload accepted from a client, in bytes
    #[serde(default = "default_max_frame_payload")]
    pub max_frame_payload: usize,
    /// Outbound frames buffered per connection before it counts as stalled
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Consecutive undecodable frames tolerated before disconnecting
    #[serde(default = "default_max_decode_failures")]
    pub max_decode_failures: u32,
    /// Protocol revision new sessions are created with
    #[serde(default = "default_protocol_revision")]
    pub protocol_revision: u8,
    /// Radius within which units observe each other
    #[serde(default = "default_visibility_radius")]
    pub visibility_radius: f32,
}

pub fn default_max_connections() -> usize {
    1000
}

pub fn default_max_frame_payload() -> usize {
    MAX_PAYLOAD_LEN
}

pub fn default_outbound_queue_capacity() -> usize {
    256
}

pub fn default_max_decode_failures() -> u32 {
    8
}

pub fn default_protocol_revision() -> u8 {
    CURRENT_REVISION
}

pub fn default_visibility_radius() -> f32 {
    100.0
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:1239".to_string(),
            max_connections: default_max_connections(),
            max_frame_payload: default_max_frame_payload(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            max_decode_failures: default_max_decode_failures(),
            protocol_revision: default_protocol_revision(),
            visibility_radius: default_visibility_radius(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the file settings.
    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(bind_address) = &args.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(log_level) = &args.log_level {
            self.logging.level = log_level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(revision) = args.revision {
            self.server.protocol_revision = revision;
        }
    }

    /// Converts the application configuration to the server's runtime
    /// configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            bind_address: self.server.bind_address.parse()?,
            max_connections: self.server.max_connections,
            max_frame_payload: self.server.max_frame_payload,
            outbound_queue_capacity: self.server.outbound_queue_capacity,
            max_decode_failures: self.server.max_decode_failures,
            protocol_revision: self.server.protocol_revision,
            visibility_radius: self.server.visibility_radius,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                &self.server.bind_address
            ));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.server.max_frame_payload == 0 || self.server.max_frame_payload > MAX_PAYLOAD_LEN {
            return Err(format!(
                "server.max_frame_payload must be between 1 and {MAX_PAYLOAD_LEN}"
            ));
        }

        // A zero-capacity channel cannot be created.
        if self.server.outbound_queue_capacity == 0 {
            return Err("server.outbound_queue_capacity must be greater than 0".to_string());
        }

        if self.server.max_decode_failures == 0 {
            return Err("server.max_decode_failures must be greater than 0".to_string());
        }

        let radius = self.server.visibility_radius;
        if !radius.is_finite() || radius < 0.0 {
            return Err(format!("Invalid visibility radius: {radius}"));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
