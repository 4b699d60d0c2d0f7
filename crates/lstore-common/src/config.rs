//! Configuration management for the L-Store record store

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Page layout configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Merge/compaction configuration
    #[serde(default)]
    pub merge: MergeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML or JSON file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            Self::from_toml_str(&content)?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        config.validate()?;
        debug!(path = %path.as_ref().display(), "loaded configuration");
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storage.page_capacity == 0 {
            return Err(Error::Config("storage.page_capacity must be positive".to_string()));
        }
        if self.merge.chain_threshold == 0 {
            return Err(Error::Config("merge.chain_threshold must be positive".to_string()));
        }
        if self.merge.interval_ms == 0 {
            return Err(Error::Config("merge.interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Records per page
    pub page_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { page_capacity: 512 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Run the background merge worker
    pub enabled: bool,
    /// Chain length at which a row becomes a merge candidate
    pub chain_threshold: usize,
    /// Interval between background merge passes in milliseconds
    pub interval_ms: u64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chain_threshold: 16,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
