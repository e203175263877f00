//! Batch materialization of cursor rows into a tablet
//!
//! Two phases: the first row fixes the output columns from its field
//! types, then every row (the first included) is copied into the tablet.
//! Null fields are skipped. A field of unrecognized type aborts the pull.

use tracing::debug;

use tsfile_common::error::{Error, QueryError, Result};
use tsfile_common::metrics;
use tsfile_common::types::{ColumnSelector, DataType};
use tsfile_storage::Tablet;

use crate::result_set::{ResultSetMetadata, RowCursor, RowRecord};

/// Advance `cursor` up to `max_rows` times and collect the rows.
///
/// `max_rows` only bounds the batch; the tablet is sized by the rows
/// actually read. With no rows the tablet has no columns.
pub fn pull<C: RowCursor + ?Sized>(cursor: &mut C, max_rows: usize) -> Result<Tablet> {
    if max_rows == 0 {
        return Err(Error::InvalidArgument("max_rows must be greater than zero".to_string()));
    }

    let mut records = Vec::new();
    while records.len() < max_rows && cursor.advance()? {
        records.push(cursor.current_row()?.clone());
    }

    let mut tablet = Tablet::new(cursor.table_name(), records.len().max(1))?;
    if let Some(first) = records.first() {
        discover_columns(&mut tablet, cursor.metadata(), first)?;
    }
    for (row, record) in records.iter().enumerate() {
        fill_row(&mut tablet, cursor.metadata(), row, record)?;
    }

    debug!("Pulled {} rows into {}", records.len(), tablet.owner());
    metrics::record_pull(records.len());
    Ok(tablet)
}

fn discover_columns(tablet: &mut Tablet, metadata: &ResultSetMetadata, record: &RowRecord) -> Result<()> {
    for (index, field) in record.fields().iter().enumerate() {
        let name = column_name(metadata, index);
        let data_type = match field.data_type() {
            DataType::Invalid => return Err(QueryError::UnrecognizedType(name).into()),
            DataType::Null => metadata.data_type(index).unwrap_or(DataType::Invalid),
            data_type => data_type,
        };
        if data_type == DataType::Invalid {
            return Err(QueryError::UnrecognizedType(name).into());
        }
        tablet.add_column(name, data_type)?;
    }
    Ok(())
}

fn fill_row(tablet: &mut Tablet, metadata: &ResultSetMetadata, row: usize, record: &RowRecord) -> Result<()> {
    tablet.add_timestamp(row, record.timestamp())?;
    for (index, field) in record.fields().iter().enumerate() {
        if field.data_type() == DataType::Invalid {
            return Err(QueryError::UnrecognizedType(column_name(metadata, index)).into());
        }
        if let Some(value) = field.value() {
            tablet.add_value(row, ColumnSelector::Index(index), value.clone())?;
        }
    }
    Ok(())
}

fn column_name(metadata: &ResultSetMetadata, index: usize) -> String {
    metadata
        .column_name(index)
        .map_or_else(|| format!("column{index}"), str::to_string)
}
