//! Reader session
//!
//! Loads a closed file: verifies every record, restores the schema
//! registry from the footer and rebuilds each series sorted by time.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use tsfile_common::error::{Result, SchemaError, StorageError};
use tsfile_common::types::{DataType, Path as SeriesPath};

use crate::context::TsFileContext;
use crate::file::{self, ChunkGroup, Footer, RECORD_CHUNK_GROUP, RECORD_FOOTER};
use crate::schema::{ColumnSchema, SchemaRegistry, TableSchema, TimeseriesSchema};
use crate::series::{SeriesBuilder, SeriesData};

/// Read handle on one closed TsFile
#[derive(Debug)]
pub struct TsFileReader {
    path: PathBuf,
    registry: SchemaRegistry,
    series: BTreeMap<SeriesPath, Arc<SeriesData>>,
    default_batch_rows: usize,
}

impl TsFileReader {
    /// Open a file written and closed by [`crate::TsFileWriter`]
    pub fn open(ctx: &TsFileContext, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening TsFile reader at {:?}", path);

        let records = file::read_records(path)?;
        let footer: Footer = match records.last() {
            Some(record) if record.kind == RECORD_FOOTER => file::decode(&record.payload)?,
            _ => {
                return Err(StorageError::OpenFailed(format!(
                    "{} has no footer; the writer was not closed",
                    path.display()
                ))
                .into())
            }
        };

        let mut builders: BTreeMap<SeriesPath, SeriesBuilder> = BTreeMap::new();
        let mut groups = 0u64;
        for record in records.iter().filter(|r| r.kind == RECORD_CHUNK_GROUP) {
            let group: ChunkGroup = file::decode(&record.payload)?;
            groups += 1;
            for chunk in group.chunks {
                if chunk.timestamps.len() != chunk.values.len() {
                    return Err(StorageError::CorruptData(format!(
                        "chunk {}.{} has {} timestamps but {} values",
                        group.device,
                        chunk.measurement,
                        chunk.timestamps.len(),
                        chunk.values.len()
                    ))
                    .into());
                }
                builders
                    .entry(SeriesPath::new(group.device.clone(), chunk.measurement))
                    .or_insert_with(|| SeriesBuilder::new(chunk.data_type))
                    .extend(chunk.timestamps, chunk.values);
            }
        }
        if groups != footer.chunk_groups {
            return Err(StorageError::CorruptData(format!(
                "footer lists {} chunk groups, found {}",
                footer.chunk_groups, groups
            ))
            .into());
        }

        let series: BTreeMap<_, _> = builders
            .into_iter()
            .map(|(path, builder)| (path, Arc::new(builder.build())))
            .collect();
        debug!("Loaded {} series from {} chunk groups", series.len(), groups);

        Ok(Self {
            path: path.to_path_buf(),
            registry: footer.schema,
            series,
            default_batch_rows: ctx.query().default_batch_rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full schema registry stored in the footer
    pub fn schema(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Rows a batch pull materializes when the caller gives no size
    pub fn default_batch_rows(&self) -> usize {
        self.default_batch_rows
    }

    /// Timeseries registered for a device
    pub fn timeseries_schema(&self, device_id: &str) -> Result<Vec<TimeseriesSchema>> {
        self.registry
            .get(device_id)
            .map(|schema| schema.columns().to_vec())
            .ok_or_else(|| SchemaError::DeviceNotFound(device_id.to_string()).into())
    }

    /// Schema of a table registered with `register_table`
    pub fn table_schema(&self, name: &str) -> Result<&TableSchema> {
        self.registry
            .tables()
            .find(|t| t.name() == name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()).into())
    }

    pub fn all_table_schemas(&self) -> Vec<&TableSchema> {
        self.registry.tables().collect()
    }

    /// Registered schema of one column path
    pub fn column_schema(&self, path: &SeriesPath) -> Result<&ColumnSchema> {
        self.registry.lookup_column(&path.device, &path.measurement)
    }

    /// Data of a registered series; empty when nothing was written to it
    pub fn series(&self, path: &SeriesPath) -> Result<Arc<SeriesData>> {
        let column = self.column_schema(path)?;
        Ok(self
            .series
            .get(path)
            .cloned()
            .unwrap_or_else(|| Arc::new(SeriesData::empty(column.data_type))))
    }

    pub fn data_type(&self, path: &SeriesPath) -> Result<DataType> {
        Ok(self.column_schema(path)?.data_type)
    }

    /// Paths of every registered column, in owner then column order
    pub fn all_paths(&self) -> Vec<SeriesPath> {
        self.registry
            .owners()
            .flat_map(|owner| {
                owner
                    .columns()
                    .iter()
                    .map(move |c| SeriesPath::new(owner.name(), c.name.clone()))
            })
            .collect()
    }

    pub fn close(self) {
        info!("Closed TsFile reader at {:?}", self.path);
    }
}
