//! Core runtime infrastructure.
//!
//! - `config` - Configuration parsing and validation
//! - `ids` - Identifier generation
//! - `runtime` - Main runtime orchestration
//! - `time` - Deterministic time utilities

pub mod config;
pub mod ids;
pub mod runtime;
pub mod time;

pub use config::*;
pub use runtime::*;
pub use time::*;
