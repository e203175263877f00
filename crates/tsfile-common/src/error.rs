//! Error types for TsFile
//!
//! Provides a unified error type hierarchy for the entire system. Every
//! error maps onto the integer code taxonomy exposed by [`Error::code`];
//! zero is reserved for success and is never produced by an error.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::DataType;

/// Result type alias using TsFile's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Integer error codes shared with non-Rust callers.
pub mod codes {
    pub const E_OK: i32 = 0;
    pub const E_NOT_EXIST: i32 = 2;
    pub const E_ALREADY_EXIST: i32 = 3;
    pub const E_INVALID_ARG: i32 = 4;
    pub const E_OUT_OF_RANGE: i32 = 5;
    pub const E_TYPE_NOT_SUPPORTED: i32 = 26;
    pub const E_TYPE_MISMATCH: i32 = 27;
    pub const E_FILE_OPEN_ERR: i32 = 28;
    pub const E_FILE_CLOSE_ERR: i32 = 29;
    pub const E_FILE_WRITE_ERR: i32 = 30;
    pub const E_FILE_READ_ERR: i32 = 31;
    pub const E_FILE_SYNC_ERR: i32 = 32;
    pub const E_METADATA_ERR: i32 = 33;
    pub const E_BUF_NOT_ENOUGH: i32 = 36;
    pub const E_DEVICE_NOT_EXIST: i32 = 44;
    pub const E_MEASUREMENT_NOT_EXIST: i32 = 45;
    pub const E_INVALID_QUERY: i32 = 46;
    pub const E_FILTER_GROUP_FULL: i32 = 47;
    pub const E_TABLE_NOT_EXIST: i32 = 49;
    pub const E_UNKNOWN: i32 = -1;
}

/// Main error type for TsFile
#[derive(Error, Debug)]
pub enum Error {
    // Schema Errors
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // Storage Errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // Query Errors
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    #[error("Type not supported: {0}")]
    TypeNotSupported(DataType),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Configuration Errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO Errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Schema registration and lookup errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Column {column} already registered for {owner}")]
    AlreadyExists { owner: String, column: String },

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Duplicate column {column} in schema {owner}")]
    DuplicateColumn { owner: String, column: String },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column {column} not found in {owner}")]
    ColumnNotFound { owner: String, column: String },
}

/// Buffer and file-level errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Buffer not enough: capacity {capacity} reached")]
    BufferNotEnough { capacity: usize },

    #[error("Row index {row} out of range for capacity {capacity}")]
    RowOutOfRange { row: usize, capacity: usize },

    #[error("Column index {index} out of range for {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("Column {0} not found in tablet")]
    UnknownColumn(String),

    #[error("Columns are frozen once data has been written")]
    ColumnsFrozen,

    #[error("File already exists: {}", .0.display())]
    FileAlreadyExists(PathBuf),

    #[error("Open failed: {0}")]
    OpenFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Sync failed: {0}")]
    SyncFailed(String),

    #[error("Corrupt data: {0}")]
    CorruptData(String),
}

/// Filter construction and result-cursor errors
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Filter group full: at most {0} children")]
    FilterGroupFull(usize),

    #[error("Expression is not a {0} group")]
    NotAGroup(&'static str),

    #[error("Column not selected: {0}")]
    ColumnNotSelected(String),

    #[error("No current row")]
    NoCurrentRow,

    #[error("Value is null: {0}")]
    NullValue(String),

    #[error("Unrecognized field type in column {0}")]
    UnrecognizedType(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl Error {
    /// Integer code for this error, following the TsFile taxonomy.
    #[must_use]
    pub fn code(&self) -> i32 {
        use codes::*;
        match self {
            Error::Schema(e) => match e {
                SchemaError::AlreadyExists { .. }
                | SchemaError::TableAlreadyExists(_)
                | SchemaError::DuplicateColumn { .. } => E_ALREADY_EXIST,
                SchemaError::DeviceNotFound(_) => E_DEVICE_NOT_EXIST,
                SchemaError::TableNotFound(_) => E_TABLE_NOT_EXIST,
                SchemaError::ColumnNotFound { .. } => E_MEASUREMENT_NOT_EXIST,
            },
            Error::Storage(e) => match e {
                StorageError::BufferNotEnough { .. } => E_BUF_NOT_ENOUGH,
                StorageError::RowOutOfRange { .. } | StorageError::ColumnOutOfRange { .. } => {
                    E_OUT_OF_RANGE
                }
                StorageError::UnknownColumn(_) => E_MEASUREMENT_NOT_EXIST,
                StorageError::ColumnsFrozen => E_INVALID_ARG,
                StorageError::FileAlreadyExists(_) => E_ALREADY_EXIST,
                StorageError::OpenFailed(_) => E_FILE_OPEN_ERR,
                StorageError::WriteFailed(_) => E_FILE_WRITE_ERR,
                StorageError::ReadFailed(_) => E_FILE_READ_ERR,
                StorageError::SyncFailed(_) => E_FILE_SYNC_ERR,
                StorageError::CorruptData(_) => E_METADATA_ERR,
            },
            Error::Query(e) => match e {
                QueryError::FilterGroupFull(_) => E_FILTER_GROUP_FULL,
                QueryError::NotAGroup(_) | QueryError::NoCurrentRow => E_INVALID_ARG,
                QueryError::ColumnNotSelected(_) => E_MEASUREMENT_NOT_EXIST,
                QueryError::NullValue(_) => E_NOT_EXIST,
                QueryError::UnrecognizedType(_) => E_TYPE_NOT_SUPPORTED,
                QueryError::InvalidQuery(_) => E_INVALID_QUERY,
            },
            Error::TypeMismatch { .. } => E_TYPE_MISMATCH,
            Error::TypeNotSupported(_) => E_TYPE_NOT_SUPPORTED,
            Error::InvalidArgument(_) | Error::Config(_) => E_INVALID_ARG,
            Error::Io(_) | Error::Serialization(_) => E_UNKNOWN,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// A write that was refused before any state changed.
///
/// Carries the caller's input back so it can be corrected and resubmitted;
/// ownership of the buffer only moves to the session on success.
#[derive(Debug)]
pub struct Rejected<T> {
    pub error: Error,
    pub input: T,
}

impl<T> Rejected<T> {
    pub fn new(error: impl Into<Error>, input: T) -> Self {
        Self {
            error: error.into(),
            input,
        }
    }

    /// Error code of the underlying failure
    pub fn code(&self) -> i32 {
        self.error.code()
    }

    /// Split into the error and the returned input
    pub fn into_parts(self) -> (Error, T) {
        (self.error, self.input)
    }
}

impl<T> fmt::Display for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<T: fmt::Debug> std::error::Error for Rejected<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}
