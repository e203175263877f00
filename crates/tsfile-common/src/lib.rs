//! TsFile Common - Shared utilities and types
//!
//! This crate provides functionality used across all TsFile components:
//! - Error types and the integer error-code taxonomy
//! - Configuration management
//! - Metrics
//! - Data types, tagged values and column paths

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::TsFileConfig;
pub use error::{Error, Rejected, Result};
pub use types::*;
