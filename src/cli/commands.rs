//! CLI command runners.

use anyhow::Result;
use std::sync::Arc;

use crate::core::config::Config;
use crate::core::runtime::Runtime;
use crate::core::time::SystemClock;
use crate::ops::telemetry;
use crate::store::MemoryStore;
use crate::transport::NullTransport;

use super::args::{CheckConfigArgs, StartArgs};

pub async fn run_start(args: StartArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    let log_handle = telemetry::init_tracing(config.telemetry.log_level.as_deref())?;

    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(NullTransport);
    let mut runtime = Runtime::new(config, store, transport, SystemClock, Some(log_handle))?;
    runtime.run().await
}

pub fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    println!(
        "ok: domain={} timeout={}ms window={} grace={}ms count={}",
        config.domain,
        config.dispatch.default_timeout_ms,
        config.session.reattach_window,
        config.session.grace_period_ms,
        config.retrieval.default_count,
    );
    Ok(())
}

pub fn run_handlers() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(NullTransport);
    let runtime = Runtime::new(Config::default(), store, transport, SystemClock, None)?;
    for name in runtime.handler_names() {
        println!("{name}");
    }
    Ok(())
}
