//! TsFile Storage
//!
//! Write and read sessions for TsFile:
//! - Column, table and device schemas and the per-file schema registry
//! - Tablet, the fixed-capacity columnar write buffer
//! - TsRecord, the bounded single-row builder
//! - Writer and reader sessions over the framed on-disk record store

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod context;
pub mod record;
pub mod schema;
pub mod series;
pub mod tablet;

mod file;
mod reader;
mod writer;

pub use context::TsFileContext;
pub use file::{FILE_MAGIC, FILE_VERSION};
pub use reader::TsFileReader;
pub use record::{DataPoint, TsRecord};
pub use schema::{ColumnSchema, DeviceSchema, OwnerKind, SchemaRegistry, TableSchema, TimeseriesSchema};
pub use series::SeriesData;
pub use tablet::Tablet;
pub use writer::TsFileWriter;
