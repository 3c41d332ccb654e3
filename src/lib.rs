#![deny(unused, dead_code)]
#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: some functions are inherently complex
#![allow(clippy::too_many_lines)]
#![allow(clippy::too_many_arguments)]
// Variable naming: domain terms often similar
#![allow(clippy::similar_names)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Struct field patterns
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::struct_field_names)]
// Numeric casts: intentional in protocol code
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
// Control flow style
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::single_match_else)]
#![allow(clippy::manual_let_else)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Type defaults
#![allow(clippy::default_trait_access)]
#![allow(clippy::implicit_hasher)]
// Unit patterns
#![allow(clippy::ignored_unit_patterns)]
// Explicit returns
#![allow(clippy::semicolon_if_nothing_returned)]
// Async functions that may not await yet
#![allow(clippy::unused_async)]

//! Courier - channel-based messaging middleware.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::ids` - Identifier generation
//! - `core::runtime` - Main runtime orchestration
//! - `core::time` - Deterministic time utilities
//!
//! ## Protocol
//! - `protocol` - Principals, envelopes, messages, channels, gateway frames
//!
//! ## Subsystems
//! - `channels` - Channel registry (write-coherent cache) and subscriptions
//! - `filters` - Per-actor ordered filter templates
//! - `pipeline` - Publish finalization and retrieval
//! - `commands` - Command dispatch, correlation, built-in handlers
//! - `session` - Session lifecycle and reattachment
//!
//! ## Boundaries
//! - `store` - Document store abstraction and in-memory backend
//! - `transport` - Topic transport abstraction and test doubles
//!
//! ## Operations
//! - `ops::telemetry` - Structured logging
//!
//! ## Tools
//! - `cli` - Command-line interface

// Core infrastructure
pub mod core;

// Protocol surface
pub mod protocol;

// Subsystems
pub mod channels;
pub mod commands;
pub mod filters;
pub mod pipeline;
pub mod session;

// Boundaries
pub mod store;
pub mod transport;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, ids, runtime, time};
pub use channels::{ChannelRegistry, SubscriptionStore};
pub use commands::{CommandDispatcher, CommandHandler, HandlerContext};
pub use filters::{FilterEngine, FilterTemplate};
pub use pipeline::Pipeline;
pub use protocol::{Channel, CommandEnvelope, Message, Principal, ResultEnvelope, Status};
pub use session::{Capabilities, SessionManager};
pub use store::{DocumentStore, MemoryStore};
pub use transport::Transport;
