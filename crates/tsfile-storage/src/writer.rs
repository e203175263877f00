//! Writer session
//!
//! Owns one newly created file. Schemas are registered first; tablets and
//! records are then validated against the registry, buffered per device
//! and written out as chunk groups on flush. `close` writes the footer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use tsfile_common::error::{Error, Rejected, Result, SchemaError};
use tsfile_common::metrics;
use tsfile_common::types::{ColumnSelector, DataType, Timestamp, Value};

use crate::context::TsFileContext;
use crate::file::{Chunk, ChunkGroup, FileSink, Footer, RECORD_CHUNK_GROUP, RECORD_FOOTER};
use crate::record::TsRecord;
use crate::schema::{ColumnSchema, DeviceSchema, SchemaRegistry, TableSchema};
use crate::tablet::Tablet;

/// Per-point overhead counted against the flush threshold
const TIMESTAMP_BYTES: usize = 8;

/// Exclusive write handle on one TsFile
pub struct TsFileWriter {
    path: PathBuf,
    sink: FileSink,
    registry: SchemaRegistry,
    /// device -> measurement -> buffered points
    buffers: BTreeMap<String, BTreeMap<String, Chunk>>,
    buffered_bytes: usize,
    flush_threshold: usize,
    chunk_groups: u64,
    closed: bool,
}

impl TsFileWriter {
    /// Create a new file at `path`. Fails if anything already exists there.
    pub fn open(ctx: &TsFileContext, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening TsFile writer at {:?}", path);

        let config = ctx.writer();
        let sink = FileSink::create(path, config.max_record_bytes)?;

        Ok(Self {
            path: path.to_path_buf(),
            sink,
            registry: SchemaRegistry::new(),
            buffers: BTreeMap::new(),
            buffered_bytes: 0,
            flush_threshold: config.mem_threshold_kb.saturating_mul(1024),
            chunk_groups: 0,
            closed: false,
        })
    }

    pub fn register_table(&mut self, schema: TableSchema) -> Result<()> {
        info!("Registering table {} in {:?}", schema.name(), self.path);
        self.registry.register_table(schema)
    }

    pub fn register_timeseries(&mut self, device_id: &str, column: ColumnSchema) -> Result<()> {
        debug!("Registering timeseries {}.{}", device_id, column.name);
        self.registry.register_timeseries(device_id, column)
    }

    /// Register each timeseries of `device`; see [`SchemaRegistry::register_device`]
    pub fn register_device(&mut self, device: &DeviceSchema) -> Result<()> {
        debug!(
            "Registering device {} with {} timeseries",
            device.device_id,
            device.timeseries.len()
        );
        self.registry.register_device(device)
    }

    /// Schemas registered so far
    pub fn schema(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer every present row of `tablet`.
    ///
    /// On failure the tablet is handed back untouched and nothing is buffered.
    /// Once accepted, the data stays buffered even if the automatic flush
    /// fails; the next `flush` or `close` reports that failure.
    pub fn write_tablet(&mut self, tablet: Tablet) -> std::result::Result<(), Rejected<Tablet>> {
        let columns = match self.collect_tablet(&tablet) {
            Ok(columns) => columns,
            Err(e) => return Err(Rejected::new(e, tablet)),
        };

        let mut points = 0u64;
        for (column, timestamps, values) in columns {
            points += values.len() as u64;
            self.buffer(tablet.owner(), column, timestamps, values);
        }
        metrics::record_rows_written(tablet.owner(), tablet.current_row_count() as u64);
        metrics::record_points_written(points);
        debug!(
            "Buffered {} rows ({} points) for {}",
            tablet.current_row_count(),
            points,
            tablet.owner()
        );

        self.maybe_flush();
        Ok(())
    }

    /// Buffer the points of one record.
    ///
    /// On failure the record is handed back untouched and nothing is buffered.
    pub fn write_record(&mut self, record: TsRecord) -> std::result::Result<(), Rejected<TsRecord>> {
        if let Err(e) = self.validate_record(&record) {
            return Err(Rejected::new(e, record));
        }

        for point in record.points() {
            let column = self
                .registry
                .lookup_column(record.device_id(), &point.measurement)
                .cloned();
            if let Ok(column) = column {
                self.buffer(
                    record.device_id(),
                    &column,
                    vec![record.timestamp()],
                    vec![point.value.clone()],
                );
            }
        }
        metrics::record_rows_written(record.device_id(), 1);
        metrics::record_points_written(record.len() as u64);

        self.maybe_flush();
        Ok(())
    }

    /// Write all buffered data as one chunk group per device
    pub fn flush(&mut self) -> Result<()> {
        if self.buffers.is_empty() {
            return Ok(());
        }

        let mut groups = 0u64;
        let mut bytes = 0u64;
        while let Some((device, series)) = self.buffers.pop_first() {
            let group = ChunkGroup {
                device,
                chunks: series.into_values().collect(),
            };
            match self.sink.append(RECORD_CHUNK_GROUP, &group) {
                Ok(written) => {
                    bytes += written;
                    groups += 1;
                    self.chunk_groups += 1;
                }
                Err(e) => {
                    let chunks = group
                        .chunks
                        .into_iter()
                        .map(|chunk| (chunk.measurement.clone(), chunk))
                        .collect();
                    self.buffers.insert(group.device, chunks);
                    self.buffered_bytes = self
                        .buffers
                        .values()
                        .flat_map(|series| series.values())
                        .map(chunk_bytes)
                        .sum();
                    metrics::record_flush(groups, bytes);
                    warn!(
                        "Flush to {:?} failed after {} chunk groups; {} devices stay buffered: {}",
                        self.path,
                        groups,
                        self.buffers.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        self.buffered_bytes = 0;
        metrics::record_flush(groups, bytes);
        info!("Flushed {} chunk groups ({} bytes) to {:?}", groups, bytes, self.path);
        Ok(())
    }

    /// Flush, write the footer and sync. The file is readable afterwards.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        let footer = Footer {
            schema: self.registry.clone(),
            chunk_groups: self.chunk_groups,
        };
        self.sink.append(RECORD_FOOTER, &footer)?;
        self.sink.sync()?;
        self.closed = true;
        info!(
            "Closed TsFile writer at {:?} ({} chunk groups, {} bytes)",
            self.path,
            self.chunk_groups,
            self.sink.offset()
        );
        Ok(())
    }

    /// Check the tablet against the registry and gather its present
    /// cells column by column
    #[allow(clippy::type_complexity)]
    fn collect_tablet<'t>(
        &self,
        tablet: &'t Tablet,
    ) -> Result<Vec<(&'t ColumnSchema, Vec<Timestamp>, Vec<Value>)>> {
        let owner = tablet.owner();
        let schema = self
            .registry
            .get(owner)
            .ok_or_else(|| SchemaError::TableNotFound(owner.to_string()))?;

        let mut columns = Vec::with_capacity(tablet.column_count());
        for (index, column) in tablet.column_schemas().iter().enumerate() {
            let registered = schema.column(&column.name).ok_or_else(|| SchemaError::ColumnNotFound {
                owner: owner.to_string(),
                column: column.name.clone(),
            })?;
            check_type(registered.data_type, column.data_type)?;

            let mut timestamps = Vec::new();
            let mut values = Vec::new();
            for (row, ts) in tablet.rows() {
                if let Some(value) = tablet.get_value(row, ColumnSelector::Index(index))? {
                    timestamps.push(ts);
                    values.push(value);
                }
            }
            columns.push((column, timestamps, values));
        }
        Ok(columns)
    }

    fn validate_record(&self, record: &TsRecord) -> Result<()> {
        let device = record.device_id();
        if self.registry.get(device).is_none() {
            return Err(SchemaError::DeviceNotFound(device.to_string()).into());
        }
        for point in record.points() {
            let registered = self.registry.lookup_column(device, &point.measurement)?;
            check_type(registered.data_type, point.value.data_type())?;
        }
        Ok(())
    }

    fn buffer(
        &mut self,
        owner: &str,
        column: &ColumnSchema,
        timestamps: Vec<Timestamp>,
        values: Vec<Value>,
    ) {
        if values.is_empty() {
            return;
        }
        self.buffered_bytes += values.iter().map(point_bytes).sum::<usize>();

        let chunk = self
            .buffers
            .entry(owner.to_string())
            .or_default()
            .entry(column.name.clone())
            .or_insert_with(|| Chunk {
                measurement: column.name.clone(),
                data_type: column.data_type,
                timestamps: Vec::new(),
                values: Vec::new(),
            });
        chunk.timestamps.extend(timestamps);
        chunk.values.extend(values);
    }

    /// Flush once the threshold is reached. A failure keeps the data
    /// buffered and is left for the next explicit flush or close.
    fn maybe_flush(&mut self) {
        if self.buffered_bytes >= self.flush_threshold {
            debug!(
                "Buffered {} bytes reached threshold {}, flushing",
                self.buffered_bytes, self.flush_threshold
            );
            if let Err(e) = self.flush() {
                warn!("Automatic flush of {:?} deferred: {}", self.path, e);
            }
        }
    }
}

fn point_bytes(value: &Value) -> usize {
    value.estimated_size() + TIMESTAMP_BYTES
}

fn chunk_bytes(chunk: &Chunk) -> usize {
    chunk.values.iter().map(point_bytes).sum()
}

fn check_type(expected: DataType, actual: DataType) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(Error::TypeMismatch { expected, actual })
    }
}

impl Drop for TsFileWriter {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "TsFile writer at {:?} dropped without close; {} buffered bytes lost and the file has no footer",
                self.path, self.buffered_bytes
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsfile_common::config::TsFileConfig;
    use tsfile_common::error::codes::*;

    fn device_writer(dir: &tempfile::TempDir) -> TsFileWriter {
        let ctx = TsFileContext::default();
        let mut writer = TsFileWriter::open(&ctx, dir.path().join("w.tsfile")).unwrap();
        writer
            .register_device(&DeviceSchema::new(
                "d1",
                vec![
                    ColumnSchema::field("s1", DataType::Int64),
                    ColumnSchema::field("s2", DataType::Double),
                ],
            ))
            .unwrap();
        writer
    }

    #[test]
    fn test_open_existing_path_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = TsFileWriter::open(&TsFileContext::default(), file.path()).err().unwrap();
        assert_eq!(err.code(), E_ALREADY_EXIST);
    }

    #[test]
    fn test_write_tablet_rejects_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = device_writer(&dir);

        let mut tablet = Tablet::new("d1", 2).unwrap();
        tablet.add_column("s9", DataType::Int64).unwrap();
        tablet.add_timestamp(0, 1).unwrap();
        tablet.add_value(0, "s9", 1i64).unwrap();

        let rejected = writer.write_tablet(tablet).unwrap_err();
        assert_eq!(rejected.code(), E_MEASUREMENT_NOT_EXIST);
        let (_, tablet) = rejected.into_parts();
        assert_eq!(tablet.get::<i64>(0, "s9").unwrap(), Some(1));
        assert!(writer.buffers.is_empty());
        writer.close().unwrap();
    }

    #[test]
    fn test_write_tablet_type_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = device_writer(&dir);

        let mut tablet = Tablet::new("d1", 1).unwrap();
        tablet.add_column("s1", DataType::Int64).unwrap();
        tablet.add_column("s2", DataType::Float).unwrap();

        assert_eq!(writer.write_tablet(tablet).unwrap_err().code(), E_TYPE_MISMATCH);
        writer.close().unwrap();
    }

    #[test]
    fn test_write_tablet_unknown_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = device_writer(&dir);
        let tablet = Tablet::new("nope", 1).unwrap();
        assert_eq!(writer.write_tablet(tablet).unwrap_err().code(), E_TABLE_NOT_EXIST);
        writer.close().unwrap();
    }

    #[test]
    fn test_only_rows_with_timestamps_are_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = device_writer(&dir);

        let mut tablet = Tablet::new("d1", 3).unwrap();
        tablet.add_column("s1", DataType::Int64).unwrap();
        tablet.add_timestamp(0, 10).unwrap();
        tablet.add_value(0, "s1", 1i64).unwrap();
        tablet.add_value(1, "s1", 2i64).unwrap();
        tablet.add_timestamp(2, 12).unwrap();

        writer.write_tablet(tablet).unwrap();
        let chunk = &writer.buffers["d1"]["s1"];
        assert_eq!(chunk.timestamps, vec![10]);
        assert_eq!(chunk.values, vec![Value::Int64(1)]);
        writer.close().unwrap();
    }

    #[test]
    fn test_write_record_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = device_writer(&dir);

        let mut record = TsRecord::new("d2", 1, 1);
        record.insert("s1", 1i64).unwrap();
        assert_eq!(writer.write_record(record).unwrap_err().code(), E_DEVICE_NOT_EXIST);

        let mut record = TsRecord::new("d1", 1, 2);
        record.insert("s1", 1i64).unwrap();
        record.insert("s2", 1i32).unwrap();
        let rejected = writer.write_record(record).unwrap_err();
        assert_eq!(rejected.code(), E_TYPE_MISMATCH);
        assert_eq!(rejected.input.len(), 2);
        assert!(writer.buffers.is_empty());

        let mut record = TsRecord::new("d1", 1, 2);
        record.insert("s1", 1i64).unwrap();
        record.insert("s2", 0.5f64).unwrap();
        writer.write_record(record).unwrap();
        assert_eq!(writer.buffers["d1"].len(), 2);
        writer.close().unwrap();
    }

    #[test]
    fn test_threshold_triggers_flush() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TsFileConfig::default();
        config.writer.mem_threshold_kb = 1;
        let ctx = TsFileContext::new(config).unwrap();

        let mut writer = TsFileWriter::open(&ctx, dir.path().join("t.tsfile")).unwrap();
        writer
            .register_timeseries("d1", ColumnSchema::field("s1", DataType::Int64))
            .unwrap();

        let mut tablet = Tablet::new("d1", 100).unwrap();
        tablet.add_column("s1", DataType::Int64).unwrap();
        for row in 0..100 {
            tablet.add_timestamp(row, row as i64).unwrap();
            tablet.add_value(row, "s1", row as i64).unwrap();
        }
        writer.write_tablet(tablet).unwrap();

        assert!(writer.buffers.is_empty());
        assert_eq!(writer.chunk_groups, 1);
        writer.close().unwrap();
    }

    fn int_tablet(owner: &str, rows: usize) -> Tablet {
        let mut tablet = Tablet::new(owner, rows).unwrap();
        tablet.add_column("s1", DataType::Int64).unwrap();
        for row in 0..rows {
            let ts = i64::try_from(row).unwrap();
            tablet.add_timestamp(row, ts).unwrap();
            tablet.add_value(row, "s1", ts).unwrap();
        }
        tablet
    }

    fn small_record_writer(
        dir: &tempfile::TempDir,
        mem_threshold_kb: usize,
    ) -> (TsFileContext, PathBuf, TsFileWriter) {
        let mut config = TsFileConfig::default();
        config.writer.max_record_bytes = 600;
        config.writer.mem_threshold_kb = mem_threshold_kb;
        let ctx = TsFileContext::new(config).unwrap();
        let path = dir.path().join("small.tsfile");

        let mut writer = TsFileWriter::open(&ctx, &path).unwrap();
        for device in ["a", "b"] {
            writer
                .register_timeseries(device, ColumnSchema::field("s1", DataType::Int64))
                .unwrap();
        }
        (ctx, path, writer)
    }

    #[test]
    fn test_failed_flush_keeps_unwritten_groups() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, path, mut writer) = small_record_writer(&dir, 1024);
        writer.write_tablet(int_tablet("a", 1)).unwrap();
        writer.write_tablet(int_tablet("b", 100)).unwrap();

        assert_eq!(writer.flush().unwrap_err().code(), E_FILE_WRITE_ERR);
        assert!(!writer.buffers.contains_key("a"));
        assert_eq!(writer.buffers["b"]["s1"].values.len(), 100);
        assert_eq!(writer.buffered_bytes, 100 * 16);
        assert_eq!(writer.chunk_groups, 1);

        writer.buffers.remove("b");
        writer.buffered_bytes = 0;
        writer.close().unwrap();

        let reader = crate::reader::TsFileReader::open(&ctx, &path).unwrap();
        let series = reader
            .series(&tsfile_common::types::Path::new("a", "s1"))
            .unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn test_auto_flush_failure_keeps_accepted_tablet() {
        let dir = tempfile::tempdir().unwrap();
        let (_ctx, _path, mut writer) = small_record_writer(&dir, 1);

        writer.write_tablet(int_tablet("b", 100)).unwrap();
        assert_eq!(writer.buffers["b"]["s1"].values.len(), 100);
        assert_eq!(writer.chunk_groups, 0);

        let mut record = TsRecord::new("a", 500, 1);
        record.insert("s1", 5i64).unwrap();
        writer.write_record(record).unwrap();
        assert_eq!(writer.chunk_groups, 1);
        assert!(!writer.buffers.contains_key("a"));

        assert_eq!(writer.close().unwrap_err().code(), E_FILE_WRITE_ERR);
    }
}
