//! Curiosity CLI — transcript corpus tooling.
//!
//! Builds per-season search indexes with an external tool and loads episode
//! transcripts into the episodes database.

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
