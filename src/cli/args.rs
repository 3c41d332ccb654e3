//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Courier - channel-based messaging middleware.
#[derive(Parser)]
#[command(name = "courier")]
#[command(version)]
#[command(about = "Courier messaging middleware and diagnostic tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the Courier runtime
    Start(StartArgs),

    /// Parse and validate a configuration file without starting
    CheckConfig(CheckConfigArgs),

    /// List the built-in command handlers
    Handlers,
}

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/courier.toml")]
    pub config: PathBuf,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/courier.toml")]
    pub config: PathBuf,
}
