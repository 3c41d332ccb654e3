//! Operational concerns.
//!
//! - `telemetry` - Structured log initialization with a reloadable filter

pub mod telemetry;
