//! Configuration management for the OTP server.
//!
//! This module handles loading, validation, and conversion of server configuration
//! from TOML files and command-line arguments.

use otp_server::ServerConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

/// Application configuration loaded from TOML file.
///
/// This is the main configuration structure that encompasses all server settings
/// including networking, the schema and zone files, the object store and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration settings
    pub server: ServerSettings,
    /// Schema and zone geometry files
    pub schema: SchemaSettings,
    /// Persistent object store settings
    #[serde(default)]
    pub database: DatabaseSettings,
    /// Client agent behaviour
    #[serde(default)]
    pub agent: AgentSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
}

/// Server-specific configuration settings.
///
/// Controls the two listener addresses and connection limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Address Director participants connect to (e.g., "127.0.0.1:6666")
    pub director_address: String,
    /// Address game clients connect to (e.g., "127.0.0.1:6667")
    pub client_address: String,
    /// Maximum number of concurrent connections across both listeners
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds between health reports (0 to disable)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

/// Default for max_connections
fn default_max_connections() -> usize {
    1000
}

/// Default for stats_interval_secs
fn default_stats_interval_secs() -> u64 {
    60
}

fn default_uberdog_name() -> String {
    "UberDog".to_string()
}

fn default_talk_field() -> String {
    "setTalk".to_string()
}

/// Schema and world geometry files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Path of the TOML class/field description
    pub path: String,
    /// Optional TOML visgroup table; no visgroups when absent
    #[serde(default)]
    pub visgroups: Option<String>,
}

/// Persistent object store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Directory holding one JSON file per object; in-memory when absent
    #[serde(default)]
    pub directory: Option<String>,
}

/// Names the handler chain looks up at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Connection name identifying the UberDog participant
    #[serde(default = "default_uberdog_name")]
    pub uberdog_name: String,
    /// Field relayed from the chat manager so its sender hears it too
    #[serde(default = "default_talk_field")]
    pub talk_field: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            uberdog_name: default_uberdog_name(),
            talk_field: default_talk_field(),
        }
    }
}

/// Logging system configuration.
///
/// Controls log output format and level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                director_address: "127.0.0.1:6666".to_string(),
                client_address: "127.0.0.1:6667".to_string(),
                max_connections: default_max_connections(),
                stats_interval_secs: default_stats_interval_secs(),
            },
            schema: SchemaSettings {
                path: "otp.toml".to_string(),
                visgroups: None,
            },
            database: DatabaseSettings::default(),
            agent: AgentSettings::default(),
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, creates a default configuration file at the specified path
    /// and returns the default configuration.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
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

    /// Converts the application configuration to the runtime server configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        Ok(ServerConfig {
            director_address: self.server.director_address.parse()?,
            client_address: self.server.client_address.parse()?,
            max_connections: self.server.max_connections,
            uberdog_name: self.agent.uberdog_name.clone(),
            talk_field: self.agent.talk_field.clone(),
            stats_interval_secs: self.server.stats_interval_secs,
        })
    }

    /// Validates the configuration for consistency and correctness.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing the issue.
    pub fn validate(&self) -> Result<(), String> {
        let director = self
            .server
            .director_address
            .parse::<SocketAddr>()
            .map_err(|_| format!("Invalid director address: {}", &self.server.director_address))?;
        let client = self
            .server
            .client_address
            .parse::<SocketAddr>()
            .map_err(|_| format!("Invalid client address: {}", &self.server.client_address))?;

        // Port 0 asks the OS for a fresh port each time, so only fixed ports can clash.
        if director == client && director.port() != 0 {
            return Err(format!("Director and client listeners both use {director}"));
        }

        if self.server.max_connections == 0 {
            return Err("server.max_connections must be greater than 0".to_string());
        }

        if self.schema.path.is_empty() {
            return Err("Schema path cannot be empty".to_string());
        }

        if self.agent.uberdog_name.is_empty() {
            return Err("agent.uberdog_name cannot be empty".to_string());
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
