//! Application configuration management
//!
//! This module handles loading and validating configuration from environment variables.
//! All configuration is loaded at startup and validated before the application runs.

use std::env;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use crate::constants::{
    DEFAULT_DATA_PATH, DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_JUDGE_MODE, DEFAULT_MAX_RETRY,
    DEFAULT_RECONNECT_TIMEOUT_SECS, DEFAULT_RECV_TIMEOUT_SECS, DEFAULT_SERVER_HOST,
    DEFAULT_SERVER_PORT,
};

/// Global application configuration (lazily initialized)
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub queue: QueueConfig,
    pub judge: JudgeConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

/// Persistent storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root of all persisted state (`servers.json`, `problems/`, `submissions/`)
    pub data_path: PathBuf,
    /// Store backend: `file` or `sql:<postgres-url>`
    pub store_place: String,
}

/// Queue fabric configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// List backend: `memory` or a redis URL
    pub backend: String,
}

/// Judge dispatcher configuration
#[derive(Debug, Clone)]
pub struct JudgeConfig {
    /// Dispatch policy: 0 = one submission per server, 1 = split testcases across servers
    pub judge_mode: u8,
    /// Delay between reconnect attempts
    pub reconnect_timeout: Duration,
    /// Budget for a single protocol receive
    pub recv_timeout: Duration,
    /// Cap on reconnect attempts per worker
    pub max_retry: u32,
    /// Interval between heartbeat pings
    pub heartbeat_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            server: ServerConfig::from_env()?,
            storage: StorageConfig::from_env()?,
            queue: QueueConfig::from_env()?,
            judge: JudgeConfig::from_env()?,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| DEFAULT_SERVER_PORT.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let store_place = env::var("STORE_PLACE").unwrap_or_else(|_| "file".to_string());
        if store_place != "file" && !store_place.starts_with("sql:") {
            return Err(ConfigError::InvalidValue("STORE_PLACE".to_string()));
        }

        Ok(Self {
            data_path: PathBuf::from(
                env::var("DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string()),
            ),
            store_place,
        })
    }
}

impl QueueConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: env::var("QUEUE_BACKEND")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        })
    }
}

impl JudgeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let judge_mode: u8 = env::var("JUDGE_MODE")
            .unwrap_or_else(|_| DEFAULT_JUDGE_MODE.to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("JUDGE_MODE".to_string()))?;
        if judge_mode > 1 {
            return Err(ConfigError::InvalidValue("JUDGE_MODE".to_string()));
        }

        Ok(Self {
            judge_mode,
            reconnect_timeout: Duration::from_secs(
                env::var("RECONNECT_TIMEOUT")
                    .unwrap_or_else(|_| DEFAULT_RECONNECT_TIMEOUT_SECS.to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("RECONNECT_TIMEOUT".to_string()))?,
            ),
            recv_timeout: Duration::from_secs(
                env::var("RECV_TIMEOUT")
                    .unwrap_or_else(|_| DEFAULT_RECV_TIMEOUT_SECS.to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("RECV_TIMEOUT".to_string()))?,
            ),
            max_retry: env::var("MAX_RETRY")
                .unwrap_or_else(|_| DEFAULT_MAX_RETRY.to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("MAX_RETRY".to_string()))?,
            heartbeat_interval: Duration::from_secs(
                env::var("HEARTBEAT_INTERVAL")
                    .unwrap_or_else(|_| DEFAULT_HEARTBEAT_INTERVAL_SECS.to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("HEARTBEAT_INTERVAL".to_string()))?,
            ),
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}
