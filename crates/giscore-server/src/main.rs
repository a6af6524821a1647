// SPDX-License-Identifier: Apache-2.0

//! Binary entry point for the Giscore server.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use giscore_core::load_config;
use giscore_server::{AppState, init_logging, run_http};

/// Giscore backend: OAuth sessions and GitHub App credentials.
#[derive(Parser)]
#[command(name = "giscore-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Bind address (overrides `server.host`)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides `server.port`)
    #[arg(long)]
    port: Option<u16>,

    /// Config file (default: ./giscore.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let state = AppState::from_config(&config).context("Failed to initialize server")?;

    let host = cli.host.unwrap_or_else(|| config.server.host.clone());
    let port = cli.port.unwrap_or(config.server.port);

    run_http(state, &host, port).await
}
