//! CLI entry point for taskpulse.

mod app;
mod cli;

use anyhow::Context;
use clap::Parser;
use taskpulse::build_info::startup_metadata_line;
use taskpulse::config::load_config_with_source;
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    let loaded = load_config_with_source(args.config.as_deref()).context("loading config")?;
    let mut config = loaded.config;
    if let Some(dir) = &args.store_dir {
        config.store.dir = dir.trim().to_string();
    }

    app::logging::init(&config.logging);
    debug!(source = ?loaded.source, "{}", startup_metadata_line());

    app::run(args.command, &config).await
}
