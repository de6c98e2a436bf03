//! # tabprep command-line entry point
//!
//! ```bash
//! tabprep inspect houses.csv
//! tabprep run houses.csv --config pipeline.json --output train.parquet
//! ```
//!
//! Set `RUST_LOG=debug` (or pass `--verbose`) for stage-level detail.

#![expect(clippy::print_stdout)] // command output goes to stdout

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    tabprep::logging::init(cli.verbose).context("Failed to initialize logging")?;
    cli::run_command(cli.command)
}
