//! Session lifecycle and reattachment.
//!
//! Each client session is an independent unit of concurrency: a record in
//! the session table holding the principal, the request-sequence counter
//! (`rid`), the session's filter engine and the transport socket currently
//! bound to it. Reattachment rebinds a live session to a new socket within
//! a bounded rid window; disconnection arms a grace timer that keeps the
//! record alive long enough for a reattach after a transient drop.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::core::ids::IdGenerator;
use crate::core::time::Clock;
use crate::filters::FilterEngine;
use crate::protocol::{ConnectionStatus, Principal, ServerFrame, SessionAttrs, Status};

/// Role policy composed into a session at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_administer: bool,
    pub can_publish_as_self: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_administer: true,
            can_publish_as_self: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Connected,
    Disconnecting,
}

#[derive(Debug, Clone, Error)]
pub enum AttachError {
    #[error("no session {0}")]
    NotAvailable(String),
    #[error("attach rejected: {0}")]
    NotAuthorized(String),
}

impl AttachError {
    pub fn status(&self) -> Status {
        match self {
            Self::NotAvailable(_) => Status::NotAvailable,
            Self::NotAuthorized(_) => Status::NotAuthorized,
        }
    }
}

/// Everything a command handler needs to know about the invoking session.
#[derive(Clone)]
pub struct SessionView {
    pub session_id: String,
    pub principal: Principal,
    pub capabilities: Capabilities,
    pub filters: Arc<Mutex<FilterEngine>>,
}

struct SessionRecord {
    principal: Principal,
    rid: u64,
    phase: SessionPhase,
    outbound: mpsc::Sender<ServerFrame>,
    capabilities: Capabilities,
    filters: Arc<Mutex<FilterEngine>>,
    grace: Option<JoinHandle<()>>,
}

impl SessionRecord {
    fn attrs(&self, session_id: &str) -> SessionAttrs {
        SessionAttrs {
            session_id: session_id.to_string(),
            principal: self.principal.to_string(),
            rid: self.rid,
        }
    }
}

/// Session table plus the reattachment state machine.
pub struct SessionManager<C: Clock> {
    sessions: Arc<Mutex<HashMap<String, SessionRecord>>>,
    window: u64,
    grace_period: Duration,
    clock: C,
    ids: IdGenerator,
}

impl<C: Clock> SessionManager<C> {
    pub fn new(window: u64, grace_period: Duration, clock: C, ids: IdGenerator) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            window,
            grace_period,
            clock,
            ids,
        }
    }

    /// Establish a session for an authenticated principal and bind it to
    /// `outbound`. The socket receives the connected status and the
    /// session attributes.
    pub fn connect(
        &self,
        principal: Principal,
        capabilities: Capabilities,
        outbound: mpsc::Sender<ServerFrame>,
    ) -> SessionAttrs {
        let session_id = self.ids.next();
        let record = SessionRecord {
            principal,
            rid: 1,
            phase: SessionPhase::Connected,
            outbound: outbound.clone(),
            capabilities,
            filters: Arc::new(Mutex::new(FilterEngine::new())),
            grace: None,
        };
        let attrs = record.attrs(&session_id);
        self.sessions.lock().insert(session_id.clone(), record);

        let _ = outbound.try_send(ServerFrame::Status {
            state: ConnectionStatus::Connected,
            error: None,
        });
        let _ = outbound.try_send(ServerFrame::Attrs {
            attrs: attrs.clone(),
        });
        info!(%session_id, "session connected");
        attrs
    }

    /// Rebind a live session to a new transport socket.
    ///
    /// Succeeds only when the session exists, the claimed principal matches
    /// and the claimed rid lies within the configured window. The grace
    /// timer is cancelled inside the same critical section that rebinds the
    /// socket, so an expiring timer can never tear down a just-reattached
    /// session. A rejected attach reports on the new socket and leaves the
    /// prior binding untouched.
    pub fn attach(
        &self,
        session_id: &str,
        claimed_rid: u64,
        claimed_principal: &Principal,
        new_outbound: mpsc::Sender<ServerFrame>,
    ) -> Result<SessionAttrs, AttachError> {
        let mut sessions = self.sessions.lock();
        let outcome = match sessions.get_mut(session_id) {
            None => Err(AttachError::NotAvailable(session_id.to_string())),
            Some(record) => {
                if record.principal.bare() != claimed_principal.bare() {
                    Err(AttachError::NotAuthorized("principal mismatch".to_string()))
                } else if record.rid.abs_diff(claimed_rid) > self.window {
                    Err(AttachError::NotAuthorized(format!(
                        "rid {claimed_rid} outside window around {}",
                        record.rid
                    )))
                } else {
                    if let Some(grace) = record.grace.take() {
                        grace.abort();
                    }
                    let old = std::mem::replace(&mut record.outbound, new_outbound.clone());
                    record.phase = SessionPhase::Connected;
                    let _ = old.try_send(ServerFrame::Close);
                    let _ = new_outbound.try_send(ServerFrame::Status {
                        state: ConnectionStatus::Reattached,
                        error: None,
                    });
                    let attrs = record.attrs(session_id);
                    let _ = new_outbound.try_send(ServerFrame::Attrs {
                        attrs: attrs.clone(),
                    });
                    info!(%session_id, "session reattached");
                    Ok(attrs)
                }
            }
        };
        drop(sessions);

        if let Err(err) = &outcome {
            let _ = new_outbound.try_send(ServerFrame::Status {
                state: ConnectionStatus::Error,
                error: Some(err.status()),
            });
        }
        outcome
    }

    /// Start the disconnect grace period instead of destroying state; the
    /// record survives until the timer expires or an attach claims it.
    pub fn disconnect(&self, session_id: &str) {
        let mut sessions = self.sessions.lock();
        let Some(record) = sessions.get_mut(session_id) else {
            return;
        };
        if record.phase == SessionPhase::Disconnecting {
            return;
        }
        record.phase = SessionPhase::Disconnecting;
        let _ = record.outbound.try_send(ServerFrame::Status {
            state: ConnectionStatus::Disconnecting,
            error: None,
        });

        let sessions_ref = Arc::clone(&self.sessions);
        let sid = session_id.to_string();
        let sleep = self.clock.sleep(self.grace_period);
        record.grace = Some(tokio::spawn(async move {
            sleep.await;
            let mut sessions = sessions_ref.lock();
            // An attach that won the race flipped the phase back.
            let expired = sessions
                .get(&sid)
                .is_some_and(|r| r.phase == SessionPhase::Disconnecting);
            if expired {
                if let Some(record) = sessions.remove(&sid) {
                    let _ = record.outbound.try_send(ServerFrame::Close);
                }
                debug!(session_id = %sid, "grace period expired; session removed");
            }
        }));
        debug!(%session_id, "disconnect grace period started");
    }

    /// Advance the request-sequence counter for one inbound/outbound
    /// exchange.
    pub fn bump_rid(&self, session_id: &str) -> Option<u64> {
        let mut sessions = self.sessions.lock();
        let record = sessions.get_mut(session_id)?;
        record.rid += 1;
        Some(record.rid)
    }

    /// Write a frame to the socket currently bound to the session.
    pub fn deliver(&self, session_id: &str, frame: ServerFrame) -> bool {
        let sessions = self.sessions.lock();
        match sessions.get(session_id) {
            Some(record) => record.outbound.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn view(&self, session_id: &str) -> Option<SessionView> {
        let sessions = self.sessions.lock();
        let record = sessions.get(session_id)?;
        Some(SessionView {
            session_id: session_id.to_string(),
            principal: record.principal.clone(),
            capabilities: record.capabilities,
            filters: Arc::clone(&record.filters),
        })
    }

    pub fn phase(&self, session_id: &str) -> Option<SessionPhase> {
        self.sessions.lock().get(session_id).map(|r| r.phase)
    }

    pub fn rid(&self, session_id: &str) -> Option<u64> {
        self.sessions.lock().get(session_id).map(|r| r.rid)
    }
}
