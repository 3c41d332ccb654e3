use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::channels::{ChannelRegistry, SubscriptionStore};
use crate::commands::handlers::register_builtins;
use crate::commands::{CommandDispatcher, Correlator, HandlerContext};
use crate::core::config::Config;
use crate::core::ids::IdGenerator;
use crate::core::time::Clock;
use crate::ops::telemetry::LogHandle;
use crate::pipeline::Pipeline;
use crate::protocol::{
    ClientFrame, CommandEnvelope, ConnectionStatus, Principal, ServerFrame, Status,
};
use crate::session::{Capabilities, SessionManager, SessionPhase};
use crate::store::DocumentStore;
use crate::transport::Transport;

/// Unified runtime: wires store, transport, registry, pipeline, dispatcher
/// and session table, and owns the shutdown watch channel.
pub struct Runtime<C: Clock> {
    config: Config,
    registry: Arc<ChannelRegistry>,
    subscriptions: Arc<SubscriptionStore>,
    pipeline: Arc<Pipeline>,
    dispatcher: CommandDispatcher<C>,
    sessions: SessionManager<C>,
    transport: Arc<dyn Transport>,
    correlator: Arc<Correlator>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
}

impl<C: Clock> Runtime<C> {
    pub fn new(
        config: Config,
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn Transport>,
        clock: C,
        log_handle: Option<LogHandle>,
    ) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ids = IdGenerator::new();

        let subscriptions = Arc::new(SubscriptionStore::new(store.clone()));
        let registry = Arc::new(ChannelRegistry::new(
            store.clone(),
            transport.clone(),
            subscriptions.clone(),
            ids.clone(),
            config.domain.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            store.clone(),
            transport.clone(),
            registry.clone(),
            ids.clone(),
            config.retrieval.default_count,
        ));
        let mut dispatcher = CommandDispatcher::new(
            config.dispatch.default_timeout(),
            config.dispatch.audit,
            store,
            ids.clone(),
            clock.clone(),
        );
        register_builtins(&mut dispatcher);
        let sessions = SessionManager::new(
            config.session.reattach_window,
            config.session.grace_period(),
            clock,
            ids.clone(),
        );
        let correlator = Arc::new(Correlator::new(
            transport.clone(),
            ids,
            config.dispatch.default_timeout(),
        ));

        Ok(Self {
            config,
            registry,
            subscriptions,
            pipeline,
            dispatcher,
            sessions,
            transport,
            correlator,
            shutdown_tx,
            shutdown_rx,
            log_handle,
        })
    }

    /// Start the runtime: warm the channel cache, then wait for shutdown.
    pub async fn run(&mut self) -> Result<()> {
        self.init()?;
        info!(
            domain = %self.config.domain,
            handlers = ?self.dispatcher.handler_names(),
            "runtime ready"
        );
        self.handle_shutdown().await
    }

    /// Rebuild the channel cache from the store before serving.
    pub fn init(&self) -> Result<()> {
        self.registry
            .warm()
            .context("failed to warm channel cache")?;
        Ok(())
    }

    /// Route one inbound gateway frame.
    ///
    /// `bound` is the session currently bound to the submitting socket, if
    /// any; the return value is the binding the gateway should adopt for
    /// subsequent frames on that socket. Connect and attach establish a
    /// binding; everything else leaves it alone.
    pub async fn handle_frame(
        &self,
        bound: Option<&str>,
        frame: ClientFrame,
        outbound: &mpsc::Sender<ServerFrame>,
    ) -> Option<String> {
        match frame {
            ClientFrame::HConnect {
                principal,
                credential,
            } => {
                if credential.is_empty() {
                    reject(outbound, Status::NotAuthorized);
                    return None;
                }
                let principal = match Principal::parse(&principal) {
                    Ok(principal) => principal,
                    Err(err) => {
                        warn!(%principal, error = %err, "connect with malformed principal");
                        reject(outbound, Status::NotAuthorized);
                        return None;
                    }
                };
                let attrs =
                    self.sessions
                        .connect(principal, Capabilities::default(), outbound.clone());
                Some(attrs.session_id)
            }
            ClientFrame::Attach {
                session_id,
                rid,
                principal,
            } => {
                let principal = match Principal::parse(&principal) {
                    Ok(principal) => principal,
                    Err(err) => {
                        warn!(%session_id, error = %err, "attach with malformed principal");
                        reject(outbound, Status::NotAuthorized);
                        return None;
                    }
                };
                // A rejected attach reports on the new socket itself.
                self.sessions
                    .attach(&session_id, rid, &principal, outbound.clone())
                    .ok()
                    .map(|attrs| attrs.session_id)
            }
            ClientFrame::Command { envelope } => {
                match bound {
                    Some(session_id) => {
                        self.submit(session_id, envelope).await;
                    }
                    None => reject(outbound, Status::NotAvailable),
                }
                None
            }
            ClientFrame::Disconnect => {
                if let Some(session_id) = bound {
                    self.sessions.disconnect(session_id);
                }
                None
            }
        }
    }

    /// Execute one command on behalf of a session and deliver its single
    /// result to whichever socket is bound when it completes, so a
    /// reattachment during a slow command moves the result with the
    /// session.
    pub async fn submit(&self, session_id: &str, envelope: CommandEnvelope) -> bool {
        let Some(view) = self.sessions.view(session_id) else {
            warn!(%session_id, "command for unknown session dropped");
            return false;
        };
        self.sessions.bump_rid(session_id);
        let ctx = HandlerContext::new(
            view.principal.clone(),
            view.capabilities,
            self.registry.clone(),
            self.subscriptions.clone(),
            self.pipeline.clone(),
            view.filters,
            self.transport.clone(),
            self.correlator.clone(),
        );
        let result = self.dispatcher.execute(envelope, &view.principal, ctx).await;
        self.sessions
            .deliver(session_id, ServerFrame::Result { envelope: result })
    }

    /// Hand an inbound transport response to its pending correlation.
    pub fn resolve(&self, corrid: &str, response: serde_json::Value) -> bool {
        self.correlator.resolve(corrid, response)
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    pub fn handler_names(&self) -> Vec<String> {
        self.dispatcher.handler_names()
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    pub fn session_phase(&self, session_id: &str) -> Option<SessionPhase> {
        self.sessions.phase(session_id)
    }

    pub fn log_handle(&self) -> Option<LogHandle> {
        self.log_handle.clone()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    async fn handle_shutdown(&mut self) -> Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                warn!("shutdown signal received");
            }
            _ = self.shutdown_rx.changed() => {
                info!("shutdown requested by component");
            }
        }
        self.shutdown_tx
            .send(true)
            .context("failed to broadcast shutdown")?;
        Ok(())
    }
}

fn reject(outbound: &mpsc::Sender<ServerFrame>, error: Status) {
    let _ = outbound.try_send(ServerFrame::Status {
        state: ConnectionStatus::Error,
        error: Some(error),
    });
}
