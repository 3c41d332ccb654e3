use parking_lot::Mutex;
use std::sync::Arc;

use crate::channels::{ChannelRegistry, SubscriptionStore};
use crate::filters::FilterEngine;
use crate::pipeline::Pipeline;
use crate::protocol::Principal;
use crate::session::Capabilities;
use crate::transport::Transport;

use super::correlate::Correlator;

/// What a running handler may reach: the registry and its cache, the
/// pipeline, the invoking session's filter engine and role policy, and the
/// send-and-correlate primitive for transport requests the handler itself
/// issues.
#[derive(Clone)]
pub struct HandlerContext {
    /// Transport-asserted origin of the command.
    pub requester: Principal,
    pub capabilities: Capabilities,
    pub registry: Arc<ChannelRegistry>,
    pub subscriptions: Arc<SubscriptionStore>,
    pub pipeline: Arc<Pipeline>,
    /// Filter engine scoped to the invoking session.
    pub filters: Arc<Mutex<FilterEngine>>,
    pub transport: Arc<dyn Transport>,
    pub correlator: Arc<Correlator>,
}

impl HandlerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        requester: Principal,
        capabilities: Capabilities,
        registry: Arc<ChannelRegistry>,
        subscriptions: Arc<SubscriptionStore>,
        pipeline: Arc<Pipeline>,
        filters: Arc<Mutex<FilterEngine>>,
        transport: Arc<dyn Transport>,
        correlator: Arc<Correlator>,
    ) -> Self {
        Self {
            requester,
            capabilities,
            registry,
            subscriptions,
            pipeline,
            filters,
            transport,
            correlator,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use crate::core::ids::IdGenerator;
        use crate::store::MemoryStore;
        use crate::transport::NullTransport;
        use std::time::Duration;

        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(NullTransport);
        let subscriptions = Arc::new(SubscriptionStore::new(store.clone()));
        let registry = Arc::new(ChannelRegistry::new(
            store.clone(),
            transport.clone(),
            subscriptions.clone(),
            IdGenerator::new(),
            "example.org".to_string(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            store,
            transport.clone(),
            registry.clone(),
            IdGenerator::new(),
            10,
        ));
        Self::new(
            Principal::parse("alice@example.org/mobile").unwrap(),
            Capabilities::default(),
            registry,
            subscriptions,
            pipeline,
            Arc::new(Mutex::new(FilterEngine::new())),
            transport.clone(),
            Arc::new(Correlator::new(
                transport,
                IdGenerator::new(),
                Duration::from_secs(5),
            )),
        )
    }
}
