//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use streamlens_pipeline::BrokerTopics;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Archival object-store settings.
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "streamlens_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Broker configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Number of ordered delivery lanes per topic. One consumer worker
    /// runs per partition.
    #[serde(default = "default_partitions")]
    pub partitions: usize,

    /// Topic names, passed to the publisher and broker wiring.
    #[serde(default)]
    pub topics: BrokerTopics,
}

/// Archival object-store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Base URL of the S3-style object store. When unset, archival falls
    /// back to a non-durable in-memory store.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bucket that receives archived events.
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "streamlens.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_partitions() -> usize {
    4
}

fn default_bucket() -> String {
    "streamlens-archive".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            partitions: default_partitions(),
            topics: BrokerTopics::default(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: default_bucket(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `STREAMLENS_HOST` overrides `server.host`
/// - `STREAMLENS_PORT` overrides `server.port`
/// - `STREAMLENS_DB_PATH` overrides `database.path`
/// - `STREAMLENS_LOG_LEVEL` overrides `logging.level`
/// - `STREAMLENS_LOG_JSON` overrides `logging.json` (set to "true")
/// - `STREAMLENS_ARCHIVE_ENDPOINT` overrides `archive.endpoint`
/// - `STREAMLENS_ARCHIVE_BUCKET` overrides `archive.bucket`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("STREAMLENS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("STREAMLENS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("STREAMLENS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("STREAMLENS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("STREAMLENS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(endpoint) = std::env::var("STREAMLENS_ARCHIVE_ENDPOINT") {
        config.archive.endpoint = Some(endpoint);
    }
    if let Ok(bucket) = std::env::var("STREAMLENS_ARCHIVE_BUCKET") {
        config.archive.bucket = bucket;
    }

    Ok(config)
}
