//! Presswork CLI — schema-driven content build tool.
//!
//! Turns a directory of Markdown/YAML/JSON content into validated,
//! per-collection JSON artifacts plus deduplicated static assets.

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
