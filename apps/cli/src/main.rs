//! tepdiag CLI: Tennessee Eastman Process ETL and fault-diagnosis training.
//!
//! Imports the raw TEP simulation CSVs, converts and merges them into a
//! master dataset, splits it by simulation run and trains the
//! detector → diagnostician cascade.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
