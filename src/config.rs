//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server identity.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Database configuration.
    pub database: Option<DatabaseConfig>,
    /// Credential verification.
    pub auth: AuthConfig,
    /// Per-message coin tariffs.
    #[serde(default)]
    pub tariff: TariffConfig,
    /// Operational limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server name (e.g., "salon.example.net").
    pub name: String,
    /// Prometheus HTTP port; 0 disables the endpoint.
    pub metrics_port: Option<u16>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:7420").
    pub address: SocketAddr,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or ":memory:".
    pub path: String,
}

/// Credential verification configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC key for bearer token signatures.
    pub token_secret: String,
}

/// Coin cost per message send.
#[derive(Debug, Clone, Deserialize)]
pub struct TariffConfig {
    /// Cost of a direct message.
    #[serde(default = "default_direct_tariff")]
    pub direct_message: i64,
    /// Cost of a group message.
    #[serde(default = "default_group_tariff")]
    pub group_message: i64,
}

fn default_direct_tariff() -> i64 {
    10
}

fn default_group_tariff() -> i64 {
    5
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self { direct_message: default_direct_tariff(), group_message: default_group_tariff() }
    }
}

/// Operational limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Default member capacity for new groups.
    #[serde(default = "default_group_capacity")]
    pub group_capacity: u32,
    /// Maximum tags on a group.
    #[serde(default = "default_max_tags")]
    pub max_group_tags: usize,
    /// Maximum history page size; larger requests are clamped.
    #[serde(default = "default_max_history_limit")]
    pub max_history_limit: u32,
    /// Per-connection inbound message rate.
    #[serde(default = "default_message_rate")]
    pub message_rate_per_second: u32,
    /// Flood violations tolerated before disconnect.
    #[serde(default = "default_flood_violations")]
    pub max_flood_violations: u8,
}

fn default_group_capacity() -> u32 {
    512
}

fn default_max_tags() -> usize {
    5
}

fn default_max_history_limit() -> u32 {
    200
}

fn default_message_rate() -> u32 {
    20
}

fn default_flood_violations() -> u8 {
    3
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            group_capacity: default_group_capacity(),
            max_group_tags: default_max_tags(),
            max_history_limit: default_max_history_limit(),
            message_rate_per_second: default_message_rate(),
            max_flood_violations: default_flood_violations(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
