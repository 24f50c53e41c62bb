//! Binary entry point for repolens.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use repolens::cli::Cli;

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    repolens::observability::init_logging();

    let cli = Cli::parse();
    cli.run()?;
    Ok(())
}
