//! linkbak CLI: archive every link of a feed, page or list.
//!
//! Each link gets its own directory of artifacts (metadata, raw page, PDF,
//! readable copy, e-books, Markdown), and a global `results.json` indexes
//! them all.

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
