//! Courier CLI - unified command-line interface.
//!
//! Provides a single binary entry point for:
//! - `courier start` - Start the runtime
//! - `courier check-config` - Validate a configuration file
//! - `courier handlers` - List the built-in command handlers

mod args;
pub mod commands;

pub use args::{CheckConfigArgs, Cli, Commands, StartArgs};
