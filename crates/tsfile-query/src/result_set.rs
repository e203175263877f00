//! Result cursor over query output
//!
//! Rows are produced lazily by merging the selected series in timestamp
//! order. Every timestamp present in at least one selected series is a
//! candidate row; it is emitted when the filter holds for it.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use tsfile_common::error::{Error, QueryError, Result, StorageError};
use tsfile_common::metrics;
use tsfile_common::types::{ColumnSelector, DataType, Field, Path, Scalar, Timestamp, Value};
use tsfile_storage::SeriesData;

use crate::expression::{Expression, PointLookup};

// ============================================================================
// Metadata and Rows
// ============================================================================

/// Names and types of the selected columns, in selection order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSetMetadata {
    paths: Vec<Path>,
    column_names: Vec<String>,
    data_types: Vec<DataType>,
}

impl ResultSetMetadata {
    pub fn new(columns: Vec<(Path, DataType)>) -> Self {
        let column_names = columns.iter().map(|(path, _)| path.full_name()).collect();
        let (paths, data_types) = columns.into_iter().unzip();
        Self {
            paths,
            column_names,
            data_types,
        }
    }

    pub fn column_count(&self) -> usize {
        self.column_names.len()
    }

    /// `device.measurement` names
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn data_types(&self) -> &[DataType] {
        &self.data_types
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.column_names.get(index).map(String::as_str)
    }

    pub fn data_type(&self, index: usize) -> Option<DataType> {
        self.data_types.get(index).copied()
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.paths.get(index)
    }

    /// Position of a column by full name, else by bare measurement name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.column_names
            .iter()
            .position(|n| n == name)
            .or_else(|| self.paths.iter().position(|p| p.measurement == name))
    }

    /// Resolve a selector against the selected columns
    pub fn resolve(&self, column: ColumnSelector<'_>) -> Result<usize> {
        match column {
            ColumnSelector::Name(name) => self
                .index_of(name)
                .ok_or_else(|| QueryError::ColumnNotSelected(name.to_string()).into()),
            ColumnSelector::Index(index) if index < self.column_count() => Ok(index),
            ColumnSelector::Index(index) => Err(StorageError::ColumnOutOfRange {
                index,
                count: self.column_count(),
            }
            .into()),
        }
    }
}

/// One output row: a timestamp and a field per selected column
#[derive(Debug, Clone, PartialEq)]
pub struct RowRecord {
    timestamp: Timestamp,
    fields: Vec<Field>,
}

impl RowRecord {
    pub fn new(timestamp: Timestamp, fields: Vec<Field>) -> Self {
        Self { timestamp, fields }
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }
}

/// Forward-only row source consumed by [`crate::pull`]
pub trait RowCursor {
    fn metadata(&self) -> &ResultSetMetadata;

    /// Move to the next row; `false` once the rows are exhausted
    fn advance(&mut self) -> Result<bool>;

    /// Row the cursor is positioned on
    fn current_row(&self) -> Result<&RowRecord>;

    /// Name given to tablets materialized from this cursor
    fn table_name(&self) -> &str;
}

// ============================================================================
// Result Set
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    BeforeFirst,
    OnRow,
    Exhausted,
}

/// Series referenced by the filter, keyed by path
struct FilterSeries(BTreeMap<Path, Arc<SeriesData>>);

impl PointLookup for FilterSeries {
    fn value_at(&self, path: &Path, timestamp: Timestamp) -> Option<&Value> {
        self.0.get(path)?.value_at(timestamp)
    }
}

/// Cursor returned by [`crate::Executor`]
pub struct ResultSet {
    metadata: ResultSetMetadata,
    name: String,
    columns: Vec<Arc<SeriesData>>,
    positions: Vec<usize>,
    filter_series: FilterSeries,
    expression: Option<Expression>,
    current: Option<RowRecord>,
    state: CursorState,
    rows_read: u64,
}

impl ResultSet {
    pub(crate) fn new(
        metadata: ResultSetMetadata,
        columns: Vec<Arc<SeriesData>>,
        filter_series: BTreeMap<Path, Arc<SeriesData>>,
        expression: Option<Expression>,
    ) -> Self {
        let name = match metadata.paths.split_first() {
            Some((first, rest)) if rest.iter().all(|p| p.device == first.device) => first.device.clone(),
            _ => "result".to_string(),
        };
        Self {
            positions: vec![0; columns.len()],
            metadata,
            name,
            columns,
            filter_series: FilterSeries(filter_series),
            expression,
            current: None,
            state: CursorState::BeforeFirst,
            rows_read: 0,
        }
    }

    pub fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    /// Advance to the next matching row. Returns `false` at the end; calling
    /// again after that keeps returning `false`.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Result<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }

        while let Some(timestamp) = self.next_candidate() {
            let fields = self
                .columns
                .iter()
                .zip(self.positions.iter_mut())
                .map(|(series, pos)| match series.point(*pos) {
                    Some((ts, value)) if ts == timestamp => {
                        *pos += 1;
                        Field::new(value.clone())
                    }
                    _ => Field::null(),
                })
                .collect();

            let matched = self
                .expression
                .as_ref()
                .map_or(true, |expr| expr.evaluate(timestamp, &self.filter_series));
            if matched {
                self.current = Some(RowRecord::new(timestamp, fields));
                self.state = CursorState::OnRow;
                self.rows_read += 1;
                return Ok(true);
            }
        }

        debug!("Result set {} exhausted after {} rows", self.name, self.rows_read);
        self.current = None;
        self.state = CursorState::Exhausted;
        Ok(false)
    }

    /// Smallest unread timestamp across the selected series
    fn next_candidate(&self) -> Option<Timestamp> {
        self.columns
            .iter()
            .zip(&self.positions)
            .filter_map(|(series, pos)| series.point(*pos).map(|(ts, _)| ts))
            .min()
    }

    pub fn current_row(&self) -> Result<&RowRecord> {
        self.current
            .as_ref()
            .ok_or_else(|| QueryError::NoCurrentRow.into())
    }

    pub fn timestamp(&self) -> Result<Timestamp> {
        Ok(self.current_row()?.timestamp())
    }

    pub fn field<'a>(&self, column: impl Into<ColumnSelector<'a>>) -> Result<&Field> {
        let index = self.metadata.resolve(column.into())?;
        let row = self.current_row()?;
        Ok(&row.fields[index])
    }

    /// Whether the selected column holds no value on the current row
    pub fn is_null<'a>(&self, column: impl Into<ColumnSelector<'a>>) -> Result<bool> {
        Ok(self.field(column)?.is_null())
    }

    pub fn value<'a>(&self, column: impl Into<ColumnSelector<'a>>) -> Result<Option<&Value>> {
        Ok(self.field(column)?.value())
    }

    /// Typed read of the current row. A null cell is an error, never a
    /// default value.
    pub fn get<'a, T: Scalar>(&self, column: impl Into<ColumnSelector<'a>>) -> Result<T> {
        let column = column.into();
        let field = self.field(column)?;
        let value = field
            .value()
            .ok_or_else(|| QueryError::NullValue(column.to_string()))?;
        T::from_value(value).ok_or(Error::TypeMismatch {
            expected: value.data_type(),
            actual: T::DATA_TYPE,
        })
    }

    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    pub fn close(self) {
        debug!("Closing result set {} after {} rows", self.name, self.rows_read);
    }
}

impl RowCursor for ResultSet {
    fn metadata(&self) -> &ResultSetMetadata {
        &self.metadata
    }

    fn advance(&mut self) -> Result<bool> {
        self.next()
    }

    fn current_row(&self) -> Result<&RowRecord> {
        ResultSet::current_row(self)
    }

    fn table_name(&self) -> &str {
        &self.name
    }
}

impl Drop for ResultSet {
    fn drop(&mut self) {
        if self.rows_read > 0 {
            metrics::record_rows_read(self.rows_read);
        }
    }
}
