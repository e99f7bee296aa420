//! stowage entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Send { destination, files } => {
            let all_saved = rt.block_on(app::send(&config, &destination, files))?;
            if !all_saved {
                std::process::exit(1);
            }
        }
        Command::Storage { port, dir } => {
            tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting stowage storage");
            rt.block_on(app::storage(&config, port, dir))?;
            tracing::info!("storage server shut down cleanly");
        }
    }

    Ok(())
}
