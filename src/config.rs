//! WolfLog Configuration
//!
//! This module provides configuration structures for the WolfLog
//! commit log service.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::log::ENTRY_WIDTH;

/// Main WolfLog configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WolfLogConfig {
    /// Storage location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Commit log configuration
    #[serde(default)]
    pub log: LogConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage location configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the segment files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Commit log configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct LogConfig {
    /// Segment limits
    #[serde(default)]
    pub segment: SegmentConfig,
}

/// Segment configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Roll the active segment once its store reaches this many bytes
    #[serde(default = "default_max_store_bytes")]
    pub max_store_bytes: u64,

    /// Roll the active segment once its index reaches this many bytes;
    /// also the size of the index memory mapping
    #[serde(default = "default_max_index_bytes")]
    pub max_index_bytes: u64,

    /// Base offset of the first segment in an empty directory
    #[serde(default)]
    pub initial_offset: u64,

    /// Sync the store file after every append (slower but safer)
    #[serde(default)]
    pub fsync: bool,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// HTTP API bind address
    #[serde(default = "default_api_address")]
    pub bind_address: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_max_store_bytes() -> u64 {
    1024
}

fn default_max_index_bytes() -> u64 {
    1024
}

fn default_true() -> bool {
    true
}

fn default_api_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/wolflog")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: default_max_store_bytes(),
            max_index_bytes: default_max_index_bytes(),
            initial_offset: 0,
            fsync: false,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_api_address(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LogConfig {
    /// Replace unset (zero) limits with their defaults
    pub fn with_defaults(mut self) -> Self {
        if self.segment.max_store_bytes == 0 {
            self.segment.max_store_bytes = default_max_store_bytes();
        }
        if self.segment.max_index_bytes == 0 {
            self.segment.max_index_bytes = default_max_index_bytes();
        }
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(crate::Error::Config(format!(
                "log.segment.max_index_bytes must hold at least one {}-byte entry",
                ENTRY_WIDTH
            )));
        }

        if self.segment.max_store_bytes == 0 {
            return Err(crate::Error::Config(
                "log.segment.max_store_bytes cannot be zero".into(),
            ));
        }

        Ok(())
    }
}

impl WolfLogConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfLogConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> crate::Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to render configuration: {}", e)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("storage.data_dir cannot be empty".into()));
        }

        if self.api.enabled && self.api.bind_address.is_empty() {
            return Err(crate::Error::Config("api.bind_address cannot be empty".into()));
        }

        self.log.validate()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.storage.data_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[storage]
data_dir = "/tmp/wolflog"

[log.segment]
max_store_bytes = 4096
max_index_bytes = 36
initial_offset = 16

[api]
bind_address = "127.0.0.1:9090"
"#;

        let config = WolfLogConfig::from_str(toml).unwrap();
        assert_eq!(config.data_dir(), &PathBuf::from("/tmp/wolflog"));
        assert_eq!(config.log.segment.max_store_bytes, 4096);
        assert_eq!(config.log.segment.max_index_bytes, 36);
        assert_eq!(config.log.segment.initial_offset, 16);
        assert!(!config.log.segment.fsync);
        assert!(config.api.enabled);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = WolfLogConfig::from_str("").unwrap();
        assert_eq!(config.log.segment, SegmentConfig::default());
        assert_eq!(config.log.segment.max_store_bytes, 1024);
        assert_eq!(config.log.segment.max_index_bytes, 1024);
        assert_eq!(config.api.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_rejects_tiny_index() {
        let toml = r#"
[log.segment]
max_index_bytes = 8
"#;
        assert!(matches!(
            WolfLogConfig::from_str(toml),
            Err(crate::Error::Config(_))
        ));
    }

    #[test]
    fn test_zero_limits_get_defaults() {
        let mut config = LogConfig::default();
        config.segment.max_store_bytes = 0;
        config.segment.max_index_bytes = 0;

        let config = config.with_defaults();
        assert_eq!(config.segment.max_store_bytes, 1024);
        assert_eq!(config.segment.max_index_bytes, 1024);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = WolfLogConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed = WolfLogConfig::from_str(&rendered).unwrap();
        assert_eq!(parsed.log, config.log);
        assert_eq!(parsed.data_dir(), config.data_dir());
    }
}
