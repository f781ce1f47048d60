//! AgencyScout CLI — business-directory scraper.
//!
//! Crawls a directory's listing pages, extracts structured agency records
//! from profile pages, and appends them to a local dataset.

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
