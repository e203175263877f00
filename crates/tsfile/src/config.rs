//! Configuration loading

use std::path::Path;

use anyhow::Result;
use tracing::warn;
use tsfile_common::config::TsFileConfig;

/// Load configuration from file, falling back to defaults
pub fn load(path: Option<&Path>) -> Result<TsFileConfig> {
    match path {
        Some(path) if path.exists() => TsFileConfig::load(path).map_err(|e| anyhow::anyhow!(e)),
        Some(path) => {
            warn!("Config file {:?} not found, using defaults", path);
            Ok(TsFileConfig::default())
        }
        None => Ok(TsFileConfig::default()),
    }
}
