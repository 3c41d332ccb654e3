//! Command dispatch and correlation.
//!
//! - `context` - what a running handler may reach
//! - `correlate` - send-and-correlate primitive for handler-issued requests
//! - `handlers` - the built-in command surface
//!
//! The dispatcher resolves a named handler, verifies the claimed sender
//! against the transport-asserted origin, optionally mirrors command and
//! result to the audit collections, and races the handler against its
//! timeout so that exactly one result is emitted per received command.

pub mod context;
pub mod correlate;
pub mod handlers;

use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::core::ids::IdGenerator;
use crate::core::time::Clock;
use crate::protocol::{
    CommandEnvelope, ExecError, Principal, ResultEnvelope, Status,
};
use crate::store::{DocumentStore, COLLECTION_COMMANDS, COLLECTION_RESULTS};

pub use context::HandlerContext;
pub use correlate::Correlator;

pub type HandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, ExecError>> + Send + 'a>>;

/// A loadable named command handler.
pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-command time budget; the dispatcher default applies when `None`.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    fn exec(&self, envelope: CommandEnvelope, ctx: HandlerContext) -> HandlerFuture<'_>;
}

/// Registry of handlers plus the execution state machine
/// (`received -> authorizing -> {rejected | dispatched} -> {completed | timed-out}`).
pub struct CommandDispatcher<C: Clock> {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
    default_timeout: Duration,
    audit: bool,
    store: Arc<dyn DocumentStore>,
    ids: IdGenerator,
    clock: C,
}

impl<C: Clock> CommandDispatcher<C> {
    pub fn new(
        default_timeout: Duration,
        audit: bool,
        store: Arc<dyn DocumentStore>,
        ids: IdGenerator,
        clock: C,
    ) -> Self {
        Self {
            handlers: HashMap::new(),
            default_timeout,
            audit,
            store,
            ids,
            clock,
        }
    }

    /// Register a handler under its case-folded name.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) {
        self.handlers
            .insert(handler.name().to_lowercase(), handler);
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .handlers
            .values()
            .map(|h| h.name().to_string())
            .collect();
        names.sort();
        names
    }

    /// Run one command to its single result.
    ///
    /// Exactly one result envelope is returned per call, carrying the
    /// original `cmd` and `reqid`, whichever of authorization, resolution,
    /// completion or timeout terminated the flow.
    pub async fn execute(
        &self,
        mut envelope: CommandEnvelope,
        origin: &Principal,
        ctx: HandlerContext,
    ) -> ResultEnvelope {
        let reqid = match envelope.reqid.clone() {
            Some(reqid) => reqid,
            None => {
                let reqid = self.ids.next();
                envelope.reqid = Some(reqid.clone());
                reqid
            }
        };
        let cmd = envelope.cmd.clone();

        if let Err(err) = verify_sender(&envelope, origin) {
            return ResultEnvelope::error(&cmd, &reqid, err.status(), err.to_string());
        }

        let Some(handler) = self.handlers.get(&cmd.to_lowercase()).cloned() else {
            return ResultEnvelope::error(
                &cmd,
                &reqid,
                Status::NotAvailable,
                format!("no handler for {cmd}"),
            );
        };

        // Audit copy under a server-generated correlation id, so a
        // client-supplied reqid can never collide in the audit collections.
        let corrid = (!envelope.transient && self.audit).then(|| self.ids.next());
        if let Some(corrid) = &corrid {
            self.persist_command(corrid, &envelope);
        }

        let timeout = handler.timeout().unwrap_or(self.default_timeout);
        let outcome = self.race(handler, envelope, ctx, timeout).await;

        let result = match outcome {
            Ok(value) => ResultEnvelope::ok(&cmd, &reqid, value),
            Err(err) => ResultEnvelope::error(&cmd, &reqid, err.status(), err.to_string()),
        };
        if let Some(corrid) = &corrid {
            self.persist_result(corrid, &result);
        }
        debug!(%cmd, %reqid, status = ?result.status, "command completed");
        result
    }

    /// Single-winner race between handler completion and timer expiry.
    ///
    /// The settled flag is the only arbiter: whichever side wins its
    /// compare-and-swap owns the result, and a handler that completes after
    /// the timer has claimed the flag finds its callback ignored.
    async fn race(
        &self,
        handler: Arc<dyn CommandHandler>,
        envelope: CommandEnvelope,
        ctx: HandlerContext,
        timeout: Duration,
    ) -> Result<Value, ExecError> {
        let settled = Arc::new(AtomicBool::new(false));
        let (tx, mut rx) = oneshot::channel();

        let task_settled = Arc::clone(&settled);
        let cmd = envelope.cmd.clone();
        tokio::spawn(async move {
            let outcome = handler.exec(envelope, ctx).await;
            if task_settled
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _ = tx.send(outcome);
            } else {
                trace!(%cmd, "late handler completion ignored");
            }
        });

        tokio::select! {
            outcome = &mut rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecError::Tech("handler aborted before completion".to_string())),
            },
            () = self.clock.sleep(timeout) => {
                if settled
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    Err(ExecError::Timeout(timeout))
                } else {
                    // The handler claimed the flag first; its result is
                    // already in flight.
                    match rx.await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(ExecError::Tech(
                            "handler aborted before completion".to_string(),
                        )),
                    }
                }
            }
        }
    }

    fn persist_command(&self, corrid: &str, envelope: &CommandEnvelope) {
        let document = json!({
            "corrid": corrid,
            "cmd": envelope.cmd,
            "sender": envelope.sender,
            "reqid": envelope.reqid,
            "params": envelope.params,
        });
        if let Err(err) = self.store.save(COLLECTION_COMMANDS, corrid, document) {
            warn!(%corrid, error = %err, "command audit save failed");
        }
    }

    fn persist_result(&self, corrid: &str, result: &ResultEnvelope) {
        match serde_json::to_value(result) {
            Ok(mut document) => {
                document["corrid"] = json!(corrid);
                if let Err(err) = self.store.save(COLLECTION_RESULTS, corrid, document) {
                    warn!(%corrid, error = %err, "result audit save failed");
                }
            }
            Err(err) => warn!(%corrid, error = %err, "result not serializable for audit"),
        }
    }
}

/// The envelope's declared sender must match the transport-asserted origin
/// on the bare principal, and on the resource too when it claims one.
fn verify_sender(envelope: &CommandEnvelope, origin: &Principal) -> Result<(), ExecError> {
    let claimed = envelope
        .sender
        .as_deref()
        .ok_or_else(|| ExecError::NotAuthorized("sender missing".to_string()))?;
    let claimed = Principal::parse(claimed)
        .map_err(|e| ExecError::InvalidAttr("sender".to_string(), e.to_string()))?;
    if !claimed.matches_origin(origin) {
        return Err(ExecError::NotAuthorized(format!(
            "sender {claimed} does not match origin {origin}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::time::SystemClock;
    use crate::store::MemoryStore;

    struct SlowEcho {
        delay: Duration,
    }

    impl CommandHandler for SlowEcho {
        fn name(&self) -> &'static str {
            "slowEcho"
        }

        fn exec(&self, envelope: CommandEnvelope, _ctx: HandlerContext) -> HandlerFuture<'_> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(envelope.params)
            })
        }
    }

    fn origin() -> Principal {
        Principal::parse("alice@example.org/mobile").unwrap()
    }

    fn dispatcher(
        timeout: Duration,
        store: Arc<MemoryStore>,
    ) -> CommandDispatcher<SystemClock> {
        let mut dispatcher = CommandDispatcher::new(
            timeout,
            true,
            store,
            IdGenerator::new(),
            SystemClock,
        );
        dispatcher.register(Arc::new(SlowEcho {
            delay: Duration::from_millis(0),
        }));
        dispatcher
    }

    #[tokio::test]
    async fn test_case_insensitive_lookup() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store);
        let ctx = HandlerContext::for_tests();

        let envelope = CommandEnvelope::new("SLOWECHO")
            .with_sender("alice@example.org")
            .with_params(json!(42));
        let result = dispatcher.execute(envelope, &origin(), ctx).await;
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.result, json!(42));
    }

    #[tokio::test]
    async fn test_unknown_handler_not_available() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store);
        let envelope = CommandEnvelope::new("nope").with_sender("alice@example.org");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::NotAvailable);
    }

    #[tokio::test]
    async fn test_sender_verification() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store);

        // Bare sender matching the origin's bare form passes.
        let envelope = CommandEnvelope::new("slowEcho").with_sender("alice@example.org");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::Ok);

        // A claimed resource must match exactly.
        let envelope =
            CommandEnvelope::new("slowEcho").with_sender("alice@example.org/desktop");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::NotAuthorized);

        // A different bare principal is rejected before dispatch.
        let envelope = CommandEnvelope::new("slowEcho").with_sender("bob@example.org");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::NotAuthorized);

        let envelope = CommandEnvelope::new("slowEcho");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::NotAuthorized, "missing sender");
    }

    #[tokio::test]
    async fn test_reqid_round_trip_and_generation() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store);

        let envelope = CommandEnvelope::new("slowEcho")
            .with_sender("alice@example.org")
            .with_reqid("req-7");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.reqid, "req-7");

        let envelope = CommandEnvelope::new("slowEcho").with_sender("alice@example.org");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert!(!result.reqid.is_empty(), "reqid generated when absent");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_wins_and_late_callback_ignored() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = CommandDispatcher::new(
            Duration::from_millis(100),
            false,
            store,
            IdGenerator::new(),
            SystemClock,
        );
        dispatcher.register(Arc::new(SlowEcho {
            delay: Duration::from_secs(60),
        }));

        let envelope = CommandEnvelope::new("slowEcho")
            .with_sender("alice@example.org")
            .with_reqid("req-1");
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::ExecTimeout);

        // Let the stalled handler complete; its late callback must be a
        // no-op rather than a second emission or a panic.
        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_audit_collections_written_for_durable_commands() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store.clone());

        let envelope = CommandEnvelope::new("slowEcho")
            .with_sender("alice@example.org")
            .with_reqid("client-reqid")
            .durable();
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::Ok);

        assert_eq!(store.len(COLLECTION_COMMANDS), 1);
        assert_eq!(store.len(COLLECTION_RESULTS), 1);
        // Audit ids are server-generated, never the client reqid.
        let commands = store
            .find(COLLECTION_COMMANDS, &crate::store::Query::all())
            .unwrap();
        assert_ne!(commands[0]["corrid"], json!("client-reqid"));
        assert_eq!(commands[0]["reqid"], json!("client-reqid"));
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_change_result() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store.clone());
        store.poison("audit disk gone");

        let envelope = CommandEnvelope::new("slowEcho")
            .with_sender("alice@example.org")
            .with_params(json!("payload"))
            .durable();
        let result = dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert_eq!(result.status, Status::Ok);
        assert_eq!(result.result, json!("payload"));
    }

    #[tokio::test]
    async fn test_transient_commands_skip_audit() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = dispatcher(Duration::from_secs(1), store.clone());
        let envelope = CommandEnvelope::new("slowEcho").with_sender("alice@example.org");
        dispatcher
            .execute(envelope, &origin(), HandlerContext::for_tests())
            .await;
        assert!(store.is_empty(COLLECTION_COMMANDS));
        assert!(store.is_empty(COLLECTION_RESULTS));
    }
}
