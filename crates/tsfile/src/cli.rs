//! Command handlers

use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::{json, Map};
use tracing::info;

use tsfile_common::types::{DataType, Path as SeriesPath, Value};
use tsfile_common::Error;
use tsfile_query::{pull, Executor};
use tsfile_storage::{ColumnSchema, DeviceSchema, OwnerKind, Tablet, TsFileContext, TsFileReader, TsFileWriter};

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Shape of the demo data written by `generate`
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub devices: usize,
    pub measurements: usize,
    pub rows: usize,
    pub start: i64,
}

/// Write `devices` x `measurements` int64 series of `rows` points each.
///
/// Row `r` of every series holds value `r` at timestamp `start + r`.
pub fn generate(ctx: &TsFileContext, file: &Path, opts: GenerateOptions) -> Result<()> {
    if opts.rows == 0 {
        bail!("--rows must be greater than zero");
    }

    let mut writer = TsFileWriter::open(ctx, file)?;
    for d in 0..opts.devices {
        let device_id = format!("device{d}");
        let columns: Vec<ColumnSchema> = (0..opts.measurements)
            .map(|m| ColumnSchema::field(format!("measurement{m}"), DataType::Int64))
            .collect();
        writer.register_device(&DeviceSchema::new(device_id.clone(), columns.clone()))?;

        let mut tablet = Tablet::with_columns(device_id, columns, opts.rows)?;
        for row in 0..opts.rows {
            let offset = i64::try_from(row)?;
            tablet.add_timestamp(row, opts.start + offset)?;
            for m in 0..opts.measurements {
                tablet.add_value(row, m, offset)?;
            }
        }
        writer.write_tablet(tablet).map_err(Error::from)?;
    }
    writer.close()?;

    info!(
        "Wrote {} devices x {} measurements x {} rows to {:?}",
        opts.devices, opts.measurements, opts.rows, file
    );
    Ok(())
}

/// Print registered schemas, optionally for one device or table only
pub fn schema(ctx: &TsFileContext, file: &Path, device: Option<&str>, out: &mut impl Write) -> Result<()> {
    let reader = TsFileReader::open(ctx, file)?;
    let registry = reader.schema();

    let mut printed = 0;
    for owner in registry.owners() {
        if device.is_some_and(|d| d != owner.name()) {
            continue;
        }
        let kind = match registry.kind(owner.name()) {
            Some(OwnerKind::Table) => "table",
            _ => "device",
        };
        writeln!(out, "{} ({kind})", owner.name())?;
        for column in owner.columns() {
            writeln!(out, "  {}\t{}\t{:?}", column.name, column.data_type, column.category)?;
        }
        printed += 1;
    }

    if let (Some(device), 0) = (device, printed) {
        bail!("device or table {device} not found in {}", file.display());
    }
    reader.close();
    Ok(())
}

/// Query options collected from the command line
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub paths: Vec<String>,
    pub begin: Option<i64>,
    pub end: Option<i64>,
    pub rows: Option<usize>,
    pub format: OutputFormat,
}

/// Run a time-range query and print the rows in batches
pub fn query(ctx: &TsFileContext, file: &Path, opts: &QueryOptions, out: &mut impl Write) -> Result<u64> {
    let paths = opts
        .paths
        .iter()
        .map(|p| p.parse::<SeriesPath>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid --path")?;
    let reader = TsFileReader::open(ctx, file)?;
    let batch_rows = opts.rows.unwrap_or(reader.default_batch_rows());
    let executor = Executor::new(&reader);
    let mut result = executor.query_time_range(paths, opts.begin, opts.end)?;

    let mut total = 0u64;
    loop {
        let batch = pull(&mut result, batch_rows)?;
        if batch.current_row_count() == 0 {
            break;
        }
        total += batch.current_row_count() as u64;
        match opts.format {
            OutputFormat::Table => write!(out, "{batch}")?,
            OutputFormat::Json => {
                for row in batch_to_json(&batch)? {
                    writeln!(out, "{row}")?;
                }
            }
        }
    }

    result.close();
    info!("Query returned {} rows", total);
    Ok(total)
}

fn batch_to_json(batch: &Tablet) -> Result<Vec<serde_json::Value>> {
    let mut rows = Vec::with_capacity(batch.current_row_count());
    for (row, timestamp) in batch.rows() {
        let mut object = Map::new();
        object.insert("time".to_string(), json!(timestamp));
        for (index, column) in batch.column_schemas().iter().enumerate() {
            let value = batch.get_value(row, index)?;
            object.insert(column.name.clone(), value.map_or(serde_json::Value::Null, value_to_json));
        }
        rows.push(serde_json::Value::Object(object));
    }
    Ok(rows)
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Boolean(v) => json!(v),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Double(v) => json!(v),
        Value::Text(v) => json!(v),
    }
}
