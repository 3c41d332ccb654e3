use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

use crate::core::ids::IdGenerator;
use crate::protocol::ExecError;
use crate::transport::Transport;

/// Send-and-correlate primitive for requests a handler issues over the
/// transport.
///
/// Pending continuations are removed from the map atomically with their
/// single use, so each correlation id resolves at most once; a response
/// arriving after the request timed out finds nothing to resolve.
pub struct Correlator {
    transport: Arc<dyn Transport>,
    pending: Mutex<HashMap<String, oneshot::Sender<Value>>>,
    ids: IdGenerator,
    timeout: Duration,
}

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>, ids: IdGenerator, timeout: Duration) -> Self {
        Self {
            transport,
            pending: Mutex::new(HashMap::new()),
            ids,
            timeout,
        }
    }

    /// Issue a correlated request to `to` and await its response.
    pub async fn request(&self, to: &str, payload: Value) -> Result<Value, ExecError> {
        let corrid = self.ids.next();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(corrid.clone(), tx);

        if let Err(err) = self.transport.send(to, &corrid, &payload) {
            self.pending.lock().remove(&corrid);
            return Err(ExecError::Tech(err.to_string()));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ExecError::Tech("correlation dropped".to_string())),
            Err(_) => {
                self.pending.lock().remove(&corrid);
                Err(ExecError::Timeout(self.timeout))
            }
        }
    }

    /// Hand an inbound response to its pending continuation. Returns false
    /// when the correlation id is unknown or already used.
    pub fn resolve(&self, corrid: &str, response: Value) -> bool {
        match self.pending.lock().remove(corrid) {
            Some(tx) => tx.send(response).is_ok(),
            None => {
                trace!(%corrid, "response without pending correlation");
                false
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
