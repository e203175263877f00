//! TsFile Query Engine
//!
//! Provides:
//! - Filter expression trees over time and column values
//! - Query requests (selected paths plus an optional filter)
//! - Execution against a reader into a forward-only result cursor
//! - Batch materialization of cursor rows into tablets

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod expression;
pub mod planner;
pub mod result_set;

mod executor;
mod pull;

pub use executor::Executor;
pub use expression::{Expression, Filter, Group, Operand, Operator, PointLookup, MAX_COLUMN_FILTER_NUM};
pub use planner::{QueryExpression, UNBOUNDED};
pub use pull::pull;
pub use result_set::{ResultSet, ResultSetMetadata, RowCursor, RowRecord};
