//! Common type definitions for TsFile

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp, unit chosen by the writer (usually milliseconds)
pub type Timestamp = i64;

// ============================================================================
// Data Types
// ============================================================================

/// Physical data type of a column
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DataType {
    Boolean,
    Int32,
    Int64,
    Float,
    Double,
    Text,
    /// Type of a field that holds no value
    Null,
    /// Unrecognized type
    Invalid,
}

impl DataType {
    /// Whether a column may be declared with this type
    #[must_use]
    pub fn is_storable(self) -> bool {
        !matches!(self, DataType::Null | DataType::Invalid)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Text => "TEXT",
            DataType::Null => "NULL",
            DataType::Invalid => "INVALID",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => Ok(DataType::Boolean),
            "INT32" => Ok(DataType::Int32),
            "INT64" => Ok(DataType::Int64),
            "FLOAT" => Ok(DataType::Float),
            "DOUBLE" => Ok(DataType::Double),
            "TEXT" | "STRING" => Ok(DataType::Text),
            other => Err(Error::InvalidArgument(format!("unknown data type {other}"))),
        }
    }
}

/// Role of a column inside a table. Metadata only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ColumnCategory {
    /// Identifying column
    Tag,
    /// Measured value
    #[default]
    Field,
    /// Descriptive metadata
    Attribute,
}

// ============================================================================
// Values
// ============================================================================

/// A single scalar tagged with its type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Text(String),
}

impl Value {
    #[must_use]
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Boolean(_) => DataType::Boolean,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Typed view of this value; `None` when the type differs
    pub fn get<T: Scalar>(&self) -> Option<T> {
        T::from_value(self)
    }

    fn as_exact_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Compare two values.
    ///
    /// Numeric types compare with each other, text compares
    /// lexicographically and booleans order `false < true`. Any other
    /// pairing, or a NaN operand, is incomparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            _ => {
                if let (Some(a), Some(b)) = (self.as_exact_i64(), other.as_exact_i64()) {
                    return Some(a.cmp(&b));
                }
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
        }
    }

    /// Rough in-memory footprint, used for flush accounting
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        match self {
            Value::Boolean(_) => 1,
            Value::Int32(_) | Value::Float(_) => 4,
            Value::Int64(_) | Value::Double(_) => 8,
            Value::Text(s) => s.len() + 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Rust scalar types that map one-to-one onto a [`DataType`]
pub trait Scalar: Sized {
    const DATA_TYPE: DataType;

    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident) => {
        impl Scalar for $ty {
            const DATA_TYPE: DataType = DataType::$variant;

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_scalar!(bool, Boolean);
impl_scalar!(i32, Int32);
impl_scalar!(i64, Int64);
impl_scalar!(f32, Float);
impl_scalar!(f64, Double);
impl_scalar!(String, Text);

// ============================================================================
// Fields
// ============================================================================

/// One cell of a result row: a value, or null
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    data_type: DataType,
    value: Option<Value>,
}

impl Field {
    pub fn new(value: Value) -> Self {
        Self {
            data_type: value.data_type(),
            value: Some(value),
        }
    }

    pub fn null() -> Self {
        Self {
            data_type: DataType::Null,
            value: None,
        }
    }

    /// Field carrying a type the reader does not recognize
    pub fn unrecognized() -> Self {
        Self {
            data_type: DataType::Invalid,
            value: None,
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }
}

impl From<Option<Value>> for Field {
    fn from(value: Option<Value>) -> Self {
        value.map_or_else(Field::null, Field::new)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("null"),
        }
    }
}

// ============================================================================
// Paths and selectors
// ============================================================================

/// A column path: owning device/table plus column name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path {
    pub device: String,
    pub measurement: String,
}

impl Path {
    pub fn new(device: impl Into<String>, measurement: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            measurement: measurement.into(),
        }
    }

    /// `device.measurement`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.device, self.measurement)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.device, self.measurement)
    }
}

impl FromStr for Path {
    type Err = Error;

    /// Splits on the last `.`, so devices may themselves contain dots
    fn from_str(s: &str) -> Result<Self> {
        match s.rsplit_once('.') {
            Some((device, measurement)) if !device.is_empty() && !measurement.is_empty() => {
                Ok(Path::new(device, measurement))
            }
            _ => Err(Error::InvalidArgument(format!(
                "path {s} is not of the form device.measurement"
            ))),
        }
    }
}

/// Column addressed by name or by zero-based position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSelector<'a> {
    Name(&'a str),
    Index(usize),
}

impl<'a> From<&'a str> for ColumnSelector<'a> {
    fn from(name: &'a str) -> Self {
        ColumnSelector::Name(name)
    }
}

impl<'a> From<&'a String> for ColumnSelector<'a> {
    fn from(name: &'a String) -> Self {
        ColumnSelector::Name(name.as_str())
    }
}

impl From<usize> for ColumnSelector<'_> {
    fn from(index: usize) -> Self {
        ColumnSelector::Index(index)
    }
}

impl fmt::Display for ColumnSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSelector::Name(name) => f.write_str(name),
            ColumnSelector::Index(index) => write!(f, "#{index}"),
        }
    }
}
