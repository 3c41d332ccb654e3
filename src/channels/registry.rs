use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::ids::IdGenerator;
use crate::protocol::channel::{PRIORITY_MAX, PRIORITY_MIN};
use crate::protocol::{Channel, ExecError, Principal};
use crate::store::{DocumentStore, Query, COLLECTION_CHANNELS};
use crate::transport::{TopicPolicy, Transport};

use super::subscriptions::SubscriptionStore;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("missing attribute {0}")]
    Missing(String),
    #[error("invalid attribute {0}: {1}")]
    Invalid(String, String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("technical error: {0}")]
    Tech(String),
}

impl From<RegistryError> for ExecError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Missing(field) => ExecError::MissingAttr(field),
            RegistryError::Invalid(field, reason) => ExecError::InvalidAttr(field, reason),
            RegistryError::NotAuthorized(reason) => ExecError::NotAuthorized(reason),
            RegistryError::Tech(reason) => ExecError::Tech(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Authoritative channel store plus its read cache.
///
/// The cache is a derived, coherent copy: rebuilt by [`warm`](Self::warm) on
/// startup and updated synchronously after every successful write, inside
/// the same critical section, so no handler observes a state older than the
/// last committed write. Reads are lock-free apart from the `RwLock` read
/// guard; the read-modify-write upsert path serializes on a write mutex.
pub struct ChannelRegistry {
    store: Arc<dyn DocumentStore>,
    transport: Arc<dyn Transport>,
    subscriptions: Arc<SubscriptionStore>,
    ids: IdGenerator,
    domain: String,
    cache: RwLock<HashMap<String, Channel>>,
    write_lock: Mutex<()>,
}

impl ChannelRegistry {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        transport: Arc<dyn Transport>,
        subscriptions: Arc<SubscriptionStore>,
        ids: IdGenerator,
        domain: String,
    ) -> Self {
        Self {
            store,
            transport,
            subscriptions,
            ids,
            domain,
            cache: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Rebuild the cache from the store; returns the number of channels.
    pub fn warm(&self) -> Result<usize, RegistryError> {
        let _write = self.write_lock.lock();
        let documents = self
            .store
            .stream(COLLECTION_CHANNELS, &Query::all())
            .map_err(|e| RegistryError::Tech(e.to_string()))?;
        let mut fresh = HashMap::new();
        for document in documents {
            match serde_json::from_value::<Channel>(document) {
                Ok(channel) => {
                    if let Some(chid) = channel.chid.clone() {
                        fresh.insert(chid, channel);
                    }
                }
                Err(err) => warn!(error = %err, "skipping undecodable channel document"),
            }
        }
        let count = fresh.len();
        *self.cache.write() = fresh;
        info!(channels = count, "channel cache warmed");
        Ok(count)
    }

    /// Cache lookup, O(1); the cache never lags a committed write.
    pub fn get(&self, chid: &str) -> Option<Channel> {
        self.cache.read().get(chid).cloned()
    }

    /// Drop the cache entry. Channel documents are never physically removed
    /// on this path.
    pub fn remove(&self, chid: &str) {
        self.cache.write().remove(chid);
    }

    /// Idempotent create-or-update.
    ///
    /// Creation provisions the transport topic before the document is
    /// saved; updates may only come from the owner, never change the owner,
    /// and unsubscribe any principal dropped from the authorized set.
    pub fn upsert(
        &self,
        mut delta: Channel,
        requester: &Principal,
    ) -> Result<(UpsertOutcome, Channel), RegistryError> {
        let chid = match delta.chid.clone() {
            Some(chid) => chid,
            None => self.ids.next_chid(&self.domain),
        };
        validate_chid(&chid)?;
        validate_channel_fields(&delta)?;
        delta.chid = Some(chid.clone());

        let _write = self.write_lock.lock();
        let existing = self.cache.read().get(&chid).cloned();
        match existing {
            None => self.create(chid, delta, requester),
            Some(existing) => self.update(chid, delta, existing, requester),
        }
    }

    fn create(
        &self,
        chid: String,
        mut delta: Channel,
        requester: &Principal,
    ) -> Result<(UpsertOutcome, Channel), RegistryError> {
        let owner = delta.owner.clone().unwrap_or_else(|| requester.bare().to_string());
        if owner != requester.bare() {
            return Err(RegistryError::NotAuthorized(format!(
                "channel owner {owner} does not match requester {}",
                requester.bare()
            )));
        }
        delta.owner = Some(owner);

        self.transport
            .create_topic(&chid)
            .map_err(|e| RegistryError::Tech(e.to_string()))?;
        self.transport
            .configure_topic(&chid, &TopicPolicy::default())
            .map_err(|e| RegistryError::Tech(e.to_string()))?;

        self.save(&chid, &delta)?;
        self.cache.write().insert(chid.clone(), delta.clone());
        info!(%chid, "channel created");
        Ok((UpsertOutcome::Created, delta))
    }

    fn update(
        &self,
        chid: String,
        mut delta: Channel,
        existing: Channel,
        requester: &Principal,
    ) -> Result<(UpsertOutcome, Channel), RegistryError> {
        let owner = existing.owner.clone().unwrap_or_default();
        if requester.bare() != owner {
            return Err(RegistryError::NotAuthorized(format!(
                "only the owner may update {chid}"
            )));
        }
        if let Some(claimed) = &delta.owner {
            if *claimed != owner {
                return Err(RegistryError::NotAuthorized(
                    "channel owner is immutable".to_string(),
                ));
            }
        }
        delta.owner = Some(owner);

        // Cascading revoke: principals dropped from the authorized set lose
        // their subscription as part of the same update.
        for principal in &existing.authorized_principals {
            if !delta.authorized_principals.contains(principal) {
                self.subscriptions
                    .revoke(principal, &chid)
                    .map_err(|e| RegistryError::Tech(e.to_string()))?;
                if let Err(err) = self.transport.unsubscribe(&chid, principal) {
                    warn!(%chid, %principal, error = %err, "transport unsubscribe failed");
                }
                debug!(%chid, %principal, "revoked principal unsubscribed");
            }
        }

        self.save(&chid, &delta)?;
        self.cache.write().insert(chid.clone(), delta.clone());
        debug!(%chid, "channel updated");
        Ok((UpsertOutcome::Updated, delta))
    }

    fn save(&self, chid: &str, channel: &Channel) -> Result<(), RegistryError> {
        let document =
            serde_json::to_value(channel).map_err(|e| RegistryError::Tech(e.to_string()))?;
        self.store
            .save(COLLECTION_CHANNELS, chid, document)
            .map_err(|e| RegistryError::Tech(e.to_string()))
    }
}

fn validate_chid(chid: &str) -> Result<(), RegistryError> {
    let principal = Principal::parse(chid)
        .map_err(|e| RegistryError::Invalid("chid".to_string(), e.to_string()))?;
    if !principal.is_channel() || !principal.is_bare() {
        return Err(RegistryError::Invalid(
            "chid".to_string(),
            format!("{chid} is not a bare channel identifier"),
        ));
    }
    Ok(())
}

fn validate_channel_fields(channel: &Channel) -> Result<(), RegistryError> {
    if channel.priority > PRIORITY_MAX {
        return Err(RegistryError::Invalid(
            "priority".to_string(),
            format!("{} outside [{PRIORITY_MIN},{PRIORITY_MAX}]", channel.priority),
        ));
    }
    if let Some(owner) = &channel.owner {
        let parsed = Principal::parse(owner)
            .map_err(|e| RegistryError::Invalid("owner".to_string(), e.to_string()))?;
        if !parsed.is_bare() {
            return Err(RegistryError::Invalid(
                "owner".to_string(),
                "owner must be a bare principal".to_string(),
            ));
        }
    }
    for principal in &channel.authorized_principals {
        Principal::parse(principal).map_err(|e| {
            RegistryError::Invalid("authorized_principals".to_string(), e.to_string())
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::transport::{RecordingTransport, TransportCall};

    struct Fixture {
        registry: ChannelRegistry,
        transport: Arc<RecordingTransport>,
        store: Arc<MemoryStore>,
        subscriptions: Arc<SubscriptionStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(RecordingTransport::new());
        let subscriptions = Arc::new(SubscriptionStore::new(store.clone()));
        let registry = ChannelRegistry::new(
            store.clone(),
            transport.clone(),
            subscriptions.clone(),
            IdGenerator::new(),
            "example.org".to_string(),
        );
        Fixture {
            registry,
            transport,
            store,
            subscriptions,
        }
    }

    fn owner() -> Principal {
        Principal::parse("alice@example.org").unwrap()
    }

    fn channel(chid: &str) -> Channel {
        Channel {
            chid: Some(chid.to_string()),
            owner: Some("alice@example.org".to_string()),
            authorized_principals: vec![
                "alice@example.org".to_string(),
                "bob@example.org".to_string(),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_create_provisions_topic_and_caches() {
        let fx = fixture();
        let (outcome, saved) = fx
            .registry
            .upsert(channel("#news@example.org"), &owner())
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(saved.chid.as_deref(), Some("#news@example.org"));

        // Cache reflects the write immediately.
        let cached = fx.registry.get("#news@example.org").unwrap();
        assert_eq!(cached.owner.as_deref(), Some("alice@example.org"));

        let calls = fx.transport.calls();
        assert!(matches!(&calls[0], TransportCall::CreateTopic { chid } if chid == "#news@example.org"));
        assert!(matches!(&calls[1], TransportCall::ConfigureTopic { policy, .. }
            if !policy.persist_items && !policy.presence_delivery && !policy.notifications));
    }

    #[test]
    fn test_owner_defaults_to_requester() {
        let fx = fixture();
        let mut delta = channel("#news@example.org");
        delta.owner = None;
        let (_, saved) = fx.registry.upsert(delta, &owner()).unwrap();
        assert_eq!(saved.owner.as_deref(), Some("alice@example.org"));
    }

    #[test]
    fn test_chid_generated_when_absent() {
        let fx = fixture();
        let mut delta = channel("#x@example.org");
        delta.chid = None;
        let (_, saved) = fx.registry.upsert(delta, &owner()).unwrap();
        let chid = saved.chid.unwrap();
        assert!(chid.starts_with('#') && chid.ends_with("@example.org"));
        assert!(fx.registry.get(&chid).is_some());
    }

    #[test]
    fn test_owner_change_rejected() {
        let fx = fixture();
        fx.registry
            .upsert(channel("#news@example.org"), &owner())
            .unwrap();

        let mut stolen = channel("#news@example.org");
        stolen.owner = Some("mallory@example.org".to_string());
        let err = fx.registry.upsert(stolen, &owner()).unwrap_err();
        assert!(matches!(err, RegistryError::NotAuthorized(_)));

        // Non-owner updates are also rejected.
        let err = fx
            .registry
            .upsert(
                channel("#news@example.org"),
                &Principal::parse("mallory@example.org").unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotAuthorized(_)));
    }

    #[test]
    fn test_update_cascades_unsubscribe() {
        let fx = fixture();
        fx.registry
            .upsert(channel("#news@example.org"), &owner())
            .unwrap();
        fx.subscriptions
            .subscribe("bob@example.org", "#news@example.org")
            .unwrap();

        let mut revoked = channel("#news@example.org");
        revoked.authorized_principals = vec!["alice@example.org".to_string()];
        let (outcome, _) = fx.registry.upsert(revoked, &owner()).unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        assert!(fx.subscriptions.list("bob@example.org").unwrap().is_empty());
        assert!(fx
            .transport
            .calls()
            .iter()
            .any(|c| matches!(c, TransportCall::Unsubscribe { principal, .. }
                if principal == "bob@example.org")));
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let fx = fixture();
        let mut delta = channel("#news@example.org");
        delta.priority = 6;
        let err = fx.registry.upsert(delta, &owner()).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(field, _) if field == "priority"));
    }

    #[test]
    fn test_remove_clears_cache_only() {
        let fx = fixture();
        fx.registry
            .upsert(channel("#news@example.org"), &owner())
            .unwrap();
        fx.registry.remove("#news@example.org");
        assert!(fx.registry.get("#news@example.org").is_none());
        // Document survives removal; warm() restores it.
        assert_eq!(fx.store.len(COLLECTION_CHANNELS), 1);
        assert_eq!(fx.registry.warm().unwrap(), 1);
        assert!(fx.registry.get("#news@example.org").is_some());
    }
}
