//! tsfile - write and query columnar time-series files
//!
//! Subcommands:
//! - `generate`: write a demo file of int64 series
//! - `schema`: list the devices, tables and columns of a file
//! - `query`: read a time range of selected series in batches

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use tsfile_storage::TsFileContext;

mod cli;
mod config;

use cli::{GenerateOptions, OutputFormat, QueryOptions};

#[derive(Parser)]
#[command(name = "tsfile")]
#[command(author, version, about = "Columnar time-series file tool", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "TSFILE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a demo file
    Generate {
        /// Output file; must not exist yet
        file: PathBuf,

        /// Number of devices
        #[arg(long, default_value_t = 10)]
        devices: usize,

        /// Measurements per device
        #[arg(long, default_value_t = 10)]
        measurements: usize,

        /// Rows per device
        #[arg(long, default_value_t = 100)]
        rows: usize,

        /// First timestamp
        #[arg(long, default_value_t = 16_225_600)]
        start: i64,
    },

    /// Show registered schemas
    Schema {
        file: PathBuf,

        /// Only show this device or table
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Query selected series over a time range
    Query {
        file: PathBuf,

        /// Series to select as `device.measurement`; repeatable
        #[arg(short, long = "path", required = true)]
        paths: Vec<String>,

        /// Inclusive lower time bound
        #[arg(long, allow_hyphen_values = true)]
        begin: Option<i64>,

        /// Inclusive upper time bound
        #[arg(long, allow_hyphen_values = true)]
        end: Option<i64>,

        /// Rows per batch
        #[arg(long)]
        rows: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tsfile=info".parse()?),
        )
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = TsFileContext::new(config::load(cli.config.as_deref())?)?;

    match cli.command {
        Commands::Generate {
            file,
            devices,
            measurements,
            rows,
            start,
        } => {
            info!("Generating {:?}", file);
            cli::generate(
                &ctx,
                &file,
                GenerateOptions {
                    devices,
                    measurements,
                    rows,
                    start,
                },
            )?;
        }

        Commands::Schema { file, device } => {
            cli::schema(&ctx, &file, device.as_deref(), &mut io::stdout().lock())?;
        }

        Commands::Query {
            file,
            paths,
            begin,
            end,
            rows,
            format,
        } => {
            let opts = QueryOptions {
                paths,
                begin,
                end,
                rows,
                format,
            };
            cli::query(&ctx, &file, &opts, &mut io::stdout().lock())?;
        }
    }

    Ok(())
}
