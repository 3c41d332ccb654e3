//! Courier - unified CLI entrypoint.
//!
//! Usage:
//!   courier start --config config/courier.toml
//!   courier check-config --config config/courier.toml
//!   courier handlers

use anyhow::Result;
use clap::Parser;
use courier::cli::commands::{run_check_config, run_handlers, run_start};
use courier::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::CheckConfig(args) => run_check_config(args),
        Commands::Handlers => run_handlers(),
    }
}
