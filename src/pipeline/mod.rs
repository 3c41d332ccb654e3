//! Publish/retrieve pipeline.
//!
//! Gives messages their identity, inherits channel defaults, computes
//! relevance, gates persistence and drives the retrieval algorithms:
//! - `publish` - the ordered publication step sequence
//! - `retrieve` - last-N scan, thread retrieval, thread-status reduction

mod publish;
mod retrieve;

use std::sync::Arc;

use crate::channels::ChannelRegistry;
use crate::core::ids::IdGenerator;
use crate::protocol::{Channel, ExecError, Principal};
use crate::store::DocumentStore;
use crate::transport::Transport;

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn Transport>,
    registry: Arc<ChannelRegistry>,
    ids: IdGenerator,
    /// Fallback for last-messages retrieval when neither the request nor
    /// the channel header caps the count.
    default_count: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn Transport>,
        registry: Arc<ChannelRegistry>,
        ids: IdGenerator,
        default_count: usize,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            ids,
            default_count,
        }
    }

    /// Retrieval-side authorization: the channel must exist, be active, and
    /// count the requester among its authorized principals.
    fn require_member(&self, chid: &str, requester: &Principal) -> Result<Channel, ExecError> {
        let channel = self
            .registry
            .get(chid)
            .ok_or_else(|| ExecError::NotAvailable(format!("channel {chid}")))?;
        if !channel.active {
            return Err(ExecError::NotAuthorized(format!("channel {chid} inactive")));
        }
        if !channel.is_authorized(requester.bare()) {
            return Err(ExecError::NotAuthorized(format!(
                "{} is not a member of {chid}",
                requester.bare()
            )));
        }
        Ok(channel)
    }
}
