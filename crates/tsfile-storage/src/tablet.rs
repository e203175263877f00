//! Tablet: fixed-capacity columnar write buffer
//!
//! A tablet holds up to `capacity` rows for one device or table. Every
//! column owns a dense typed array of exactly `capacity` slots plus a
//! presence marker per slot, and all columns share one timestamp array.
//! A row takes part in a write once its timestamp has been set.

use std::fmt;

use tsfile_common::error::{Error, Result, SchemaError, StorageError};
use tsfile_common::types::{ColumnCategory, ColumnSelector, DataType, Scalar, Timestamp, Value};

use crate::schema::ColumnSchema;

/// Dense typed storage for one column
#[derive(Debug, Clone)]
enum ColumnValues {
    Boolean(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    fn with_capacity(data_type: DataType, capacity: usize) -> Result<Self> {
        Ok(match data_type {
            DataType::Boolean => ColumnValues::Boolean(vec![false; capacity]),
            DataType::Int32 => ColumnValues::Int32(vec![0; capacity]),
            DataType::Int64 => ColumnValues::Int64(vec![0; capacity]),
            DataType::Float => ColumnValues::Float(vec![0.0; capacity]),
            DataType::Double => ColumnValues::Double(vec![0.0; capacity]),
            DataType::Text => ColumnValues::Text(vec![String::new(); capacity]),
            DataType::Null | DataType::Invalid => return Err(Error::TypeNotSupported(data_type)),
        })
    }

    fn data_type(&self) -> DataType {
        match self {
            ColumnValues::Boolean(_) => DataType::Boolean,
            ColumnValues::Int32(_) => DataType::Int32,
            ColumnValues::Int64(_) => DataType::Int64,
            ColumnValues::Float(_) => DataType::Float,
            ColumnValues::Double(_) => DataType::Double,
            ColumnValues::Text(_) => DataType::Text,
        }
    }

    /// Store `value` at `row`; the slot is untouched on a type mismatch
    fn set(&mut self, row: usize, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnValues::Boolean(values), Value::Boolean(v)) => values[row] = v,
            (ColumnValues::Int32(values), Value::Int32(v)) => values[row] = v,
            (ColumnValues::Int64(values), Value::Int64(v)) => values[row] = v,
            (ColumnValues::Float(values), Value::Float(v)) => values[row] = v,
            (ColumnValues::Double(values), Value::Double(v)) => values[row] = v,
            (ColumnValues::Text(values), Value::Text(v)) => values[row] = v,
            (column, value) => {
                return Err(Error::TypeMismatch {
                    expected: column.data_type(),
                    actual: value.data_type(),
                })
            }
        }
        Ok(())
    }

    fn get(&self, row: usize) -> Value {
        match self {
            ColumnValues::Boolean(values) => Value::Boolean(values[row]),
            ColumnValues::Int32(values) => Value::Int32(values[row]),
            ColumnValues::Int64(values) => Value::Int64(values[row]),
            ColumnValues::Float(values) => Value::Float(values[row]),
            ColumnValues::Double(values) => Value::Double(values[row]),
            ColumnValues::Text(values) => Value::Text(values[row].clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnBuffer {
    values: ColumnValues,
    present: Vec<bool>,
}

/// Columnar batch of rows for a single device or table
#[derive(Debug, Clone)]
pub struct Tablet {
    owner: String,
    schemas: Vec<ColumnSchema>,
    columns: Vec<ColumnBuffer>,
    timestamps: Vec<Timestamp>,
    timestamp_set: Vec<bool>,
    row_count: usize,
    capacity: usize,
    /// Set by the first cell write; no columns may be added afterwards
    frozen: bool,
}

impl Tablet {
    /// Create an empty tablet with room for `capacity` rows
    pub fn new(owner: impl Into<String>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "tablet capacity must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            owner: owner.into(),
            schemas: Vec::new(),
            columns: Vec::new(),
            timestamps: vec![0; capacity],
            timestamp_set: vec![false; capacity],
            row_count: 0,
            capacity,
            frozen: false,
        })
    }

    /// Create a tablet and add each column in order
    pub fn with_columns(
        owner: impl Into<String>,
        columns: Vec<ColumnSchema>,
        capacity: usize,
    ) -> Result<Self> {
        let mut tablet = Self::new(owner, capacity)?;
        for column in columns {
            tablet.add_column_schema(column)?;
        }
        Ok(tablet)
    }

    /// Append a field column
    pub fn add_column(&mut self, name: impl Into<String>, data_type: DataType) -> Result<()> {
        self.add_column_schema(ColumnSchema::new(name, data_type, ColumnCategory::Field))
    }

    /// Append a column with an explicit category
    pub fn add_column_schema(&mut self, schema: ColumnSchema) -> Result<()> {
        if self.frozen {
            return Err(StorageError::ColumnsFrozen.into());
        }
        if self.schemas.iter().any(|c| c.name == schema.name) {
            return Err(SchemaError::DuplicateColumn {
                owner: self.owner.clone(),
                column: schema.name,
            }
            .into());
        }
        let values = ColumnValues::with_capacity(schema.data_type, self.capacity)?;
        self.columns.push(ColumnBuffer {
            values,
            present: vec![false; self.capacity],
        });
        self.schemas.push(schema);
        Ok(())
    }

    /// Set the timestamp of `row`, making the row present
    pub fn add_timestamp(&mut self, row: usize, timestamp: Timestamp) -> Result<()> {
        self.check_row(row)?;
        if !self.timestamp_set[row] {
            self.timestamp_set[row] = true;
            self.row_count += 1;
        }
        self.timestamps[row] = timestamp;
        self.frozen = true;
        Ok(())
    }

    /// Write one cell. Nothing changes if the row, column or type is wrong.
    pub fn add_value<'a>(
        &mut self,
        row: usize,
        column: impl Into<ColumnSelector<'a>>,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.check_row(row)?;
        let index = self.resolve(column.into())?;
        let buffer = &mut self.columns[index];
        buffer.values.set(row, value.into())?;
        buffer.present[row] = true;
        self.frozen = true;
        Ok(())
    }

    /// Stored value of a cell, `None` if it was never written
    pub fn get_value<'a>(
        &self,
        row: usize,
        column: impl Into<ColumnSelector<'a>>,
    ) -> Result<Option<Value>> {
        self.check_row(row)?;
        let buffer = &self.columns[self.resolve(column.into())?];
        Ok(buffer.present[row].then(|| buffer.values.get(row)))
    }

    /// Typed read of a cell
    pub fn get<'a, T: Scalar>(
        &self,
        row: usize,
        column: impl Into<ColumnSelector<'a>>,
    ) -> Result<Option<T>> {
        let column = column.into();
        let index = self.resolve(column)?;
        let declared = self.schemas[index].data_type;
        if declared != T::DATA_TYPE {
            return Err(Error::TypeMismatch {
                expected: declared,
                actual: T::DATA_TYPE,
            });
        }
        Ok(self
            .get_value(row, ColumnSelector::Index(index))?
            .and_then(|v| T::from_value(&v)))
    }

    /// Whether a cell holds no value
    pub fn is_null<'a>(&self, row: usize, column: impl Into<ColumnSelector<'a>>) -> Result<bool> {
        Ok(self.get_value(row, column)?.is_none())
    }

    /// Timestamp of `row` if it has been set
    pub fn timestamp(&self, row: usize) -> Option<Timestamp> {
        (row < self.capacity && self.timestamp_set[row]).then(|| self.timestamps[row])
    }

    /// Number of distinct rows whose timestamp has been set
    pub fn current_row_count(&self) -> usize {
        self.row_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn column_schemas(&self) -> &[ColumnSchema] {
        &self.schemas
    }

    pub fn column_count(&self) -> usize {
        self.schemas.len()
    }

    /// Present rows in row-index order, with their timestamps
    pub fn rows(&self) -> impl Iterator<Item = (usize, Timestamp)> + '_ {
        (0..self.capacity).filter_map(move |row| self.timestamp(row).map(|ts| (row, ts)))
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schemas.iter().position(|c| c.name == name)
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.capacity {
            return Err(StorageError::RowOutOfRange {
                row,
                capacity: self.capacity,
            }
            .into());
        }
        Ok(())
    }

    fn resolve(&self, column: ColumnSelector<'_>) -> Result<usize> {
        match column {
            ColumnSelector::Name(name) => self
                .column_index(name)
                .ok_or_else(|| StorageError::UnknownColumn(name.to_string()).into()),
            ColumnSelector::Index(index) if index < self.schemas.len() => Ok(index),
            ColumnSelector::Index(index) => Err(StorageError::ColumnOutOfRange {
                index,
                count: self.schemas.len(),
            }
            .into()),
        }
    }
}

impl fmt::Display for Tablet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("time")?;
        for schema in &self.schemas {
            write!(f, "\t{}", schema.name)?;
        }
        writeln!(f)?;
        for (row, ts) in self.rows() {
            write!(f, "{ts}")?;
            for buffer in &self.columns {
                if buffer.present[row] {
                    write!(f, "\t{}", buffer.values.get(row))?;
                } else {
                    f.write_str("\tnull")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
