//! Configuration management for shardchat
//!
//! Environment-based configuration with defaults and validation.
//! Environment variables follow the pattern: SHARDCHAT_<SECTION>_<KEY>

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Store configuration
    pub store: StoreConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_address: SocketAddr,

    /// Maximum accepted request size in bytes; larger queries are rejected
    pub max_request_bytes: usize,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base directory for persistent storage
    pub data_dir: PathBuf,

    /// Records per shard file, for every sharded collection
    pub block_size: u64,

    /// Length of generated access tokens
    pub token_len: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7878".parse().expect("static address"),
            max_request_bytes: 2048,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            block_size: 200,
            token_len: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Example: SHARDCHAT_SERVER_BIND_ADDRESS=0.0.0.0:7878
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = env::var("SHARDCHAT_SERVER_BIND_ADDRESS") {
            config.server.bind_address = addr
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid bind address: {}", e)))?;
        }
        if let Ok(max) = env::var("SHARDCHAT_SERVER_MAX_REQUEST_BYTES") {
            config.server.max_request_bytes = max.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid max request bytes: {}", e))
            })?;
        }

        if let Ok(dir) = env::var("SHARDCHAT_STORE_DATA_DIR") {
            config.store.data_dir = PathBuf::from(dir);
        }
        if let Ok(block) = env::var("SHARDCHAT_STORE_BLOCK_SIZE") {
            config.store.block_size = block
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid block size: {}", e)))?;
        }
        if let Ok(len) = env::var("SHARDCHAT_STORE_TOKEN_LEN") {
            config.store.token_len = len
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid token length: {}", e)))?;
        }

        if let Ok(level) = env::var("SHARDCHAT_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("SHARDCHAT_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON log flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.block_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "block size must be at least 1".to_string(),
            ));
        }
        if self.store.token_len == 0 {
            return Err(ConfigError::ValidationFailed(
                "token length must be at least 1".to_string(),
            ));
        }
        if self.server.max_request_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "max request size must be at least 1 byte".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.block_size, 200);
        assert_eq!(config.store.token_len, 100);
        assert_eq!(config.server.max_request_bytes, 2048);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let mut config = Config::default();
        config.store.block_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_token_len_rejected() {
        let mut config = Config::default();
        config.store.token_len = 0;
        assert!(config.validate().is_err());
    }
}
