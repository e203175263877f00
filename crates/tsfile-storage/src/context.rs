//! Storage context shared by every session a caller opens

use tracing::debug;

use tsfile_common::config::{QueryConfig, TsFileConfig, WriterConfig};
use tsfile_common::error::Result;

/// Validated configuration handed to [`crate::TsFileWriter::open`] and
/// [`crate::TsFileReader::open`]. Build it once and pass it by reference.
#[derive(Debug, Clone, Default)]
pub struct TsFileContext {
    config: TsFileConfig,
}

impl TsFileContext {
    pub fn new(config: TsFileConfig) -> Result<Self> {
        config.validate()?;
        debug!(
            "TsFile context ready: mem_threshold_kb={}, default_batch_rows={}",
            config.writer.mem_threshold_kb, config.query.default_batch_rows
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &TsFileConfig {
        &self.config
    }

    pub fn writer(&self) -> &WriterConfig {
        &self.config.writer
    }

    pub fn query(&self) -> &QueryConfig {
        &self.config.query
    }
}
