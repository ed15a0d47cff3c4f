use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::aggregator::AggregatorConfig;
use crate::persistence::PersistenceConfig;
use crate::retry::RetryConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: Option<EngineConfig>,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Durable storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database file holding the persisted job collection.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Key under which the job collection is stored.
    #[serde(default = "default_storage_key")]
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            key: default_storage_key(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("dlsync.db")
}

fn default_storage_key() -> String {
    "download-store".to_string()
}

/// External job engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Engine base URL (e.g., "http://localhost:9800")
    pub url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_timeout() -> u32 {
    30
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub engine_configured: bool,
    pub aggregator: AggregatorConfig,
    pub retry: RetryConfig,
    pub persistence: PersistenceConfig,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            storage: config.storage.clone(),
            engine_configured: config.engine.is_some(),
            aggregator: config.aggregator.clone(),
            retry: config.retry.clone(),
            persistence: config.persistence.clone(),
        }
    }
}
