//! Configuration management for TsFile

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

/// Main configuration structure for TsFile sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TsFileConfig {
    /// Writer session configuration
    #[serde(default)]
    pub writer: WriterConfig,

    /// Query configuration
    #[serde(default)]
    pub query: QueryConfig,
}

impl TsFileConfig {
    /// Load configuration from a TOML or JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: TsFileConfig = if path.as_ref().extension().map_or(false, |ext| ext == "toml") {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse JSON config: {}", e)))?
        };

        config.validate()?;
        debug!("Loaded config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Reject settings no session could run with
    pub fn validate(&self) -> Result<()> {
        if self.writer.mem_threshold_kb == 0 {
            return Err(Error::Config("writer.mem_threshold_kb must be > 0".to_string()));
        }
        if self.writer.max_record_bytes == 0 {
            return Err(Error::Config("writer.max_record_bytes must be > 0".to_string()));
        }
        if self.query.default_batch_rows == 0 {
            return Err(Error::Config("query.default_batch_rows must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Buffered data size that triggers an automatic flush
    pub mem_threshold_kb: usize,
    /// Largest single record accepted on disk
    pub max_record_bytes: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            mem_threshold_kb: 128 * 1024, // 128MB
            max_record_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Rows materialized per `pull` when the caller does not say
    pub default_batch_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_batch_rows: 1024,
        }
    }
}
