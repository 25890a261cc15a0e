//! Mojarung CLI — financial news backend.
//!
//! Runs the HTTP API and the scraping pipelines, and manages the local
//! database and config file.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
