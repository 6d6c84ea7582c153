//! graphqa CLI: convert graph datasets into question-answer corpora.
//!
//! Splits oversized line-delimited JSON graph files into record-safe
//! chunks, analyzes every graph, and writes a versioned QA dataset.

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
