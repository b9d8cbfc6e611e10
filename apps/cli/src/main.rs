//! SiteChat CLI: harvest a handful of websites and chat about them.
//!
//! Renders each URL, keeps the visible text as a corpus, and streams
//! answers from a completion provider grounded only on that corpus.

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
