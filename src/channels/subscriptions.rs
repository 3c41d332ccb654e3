use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::protocol::ExecError;
use crate::store::{DocumentStore, Query, StoreError, COLLECTION_SUBSCRIPTIONS};

/// Persisted subscription document, one per principal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SubscriptionDoc {
    principal: String,
    #[serde(default)]
    chids: Vec<String>,
}

/// Opt-in "I follow this channel" relation, distinct from a channel's
/// authorized principals. Stored in the subscription collection keyed by
/// bare principal.
pub struct SubscriptionStore {
    store: Arc<dyn DocumentStore>,
}

impl SubscriptionStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn load(&self, principal: &str) -> Result<SubscriptionDoc, StoreError> {
        let query = Query::by("principal", json!(principal));
        let mut docs = self.store.find(COLLECTION_SUBSCRIPTIONS, &query)?;
        Ok(docs
            .pop()
            .and_then(|doc| serde_json::from_value(doc).ok())
            .unwrap_or(SubscriptionDoc {
                principal: principal.to_string(),
                chids: Vec::new(),
            }))
    }

    fn persist(&self, doc: &SubscriptionDoc) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        self.store
            .save(COLLECTION_SUBSCRIPTIONS, &doc.principal, value)
    }

    /// Record that `principal` follows `chid`. Idempotent.
    pub fn subscribe(&self, principal: &str, chid: &str) -> Result<(), ExecError> {
        let mut doc = self.load(principal).map_err(tech)?;
        if !doc.chids.iter().any(|c| c == chid) {
            doc.chids.push(chid.to_string());
            self.persist(&doc).map_err(tech)?;
        }
        Ok(())
    }

    /// Remove the relation; NOT_AVAILABLE when it does not exist.
    pub fn unsubscribe(&self, principal: &str, chid: &str) -> Result<(), ExecError> {
        let mut doc = self.load(principal).map_err(tech)?;
        let before = doc.chids.len();
        doc.chids.retain(|c| c != chid);
        if doc.chids.len() == before {
            return Err(ExecError::NotAvailable(format!(
                "no subscription to {chid}"
            )));
        }
        self.persist(&doc).map_err(tech)?;
        Ok(())
    }

    /// Remove silently when present; used by the registry's cascade revoke.
    pub fn revoke(&self, principal: &str, chid: &str) -> Result<(), ExecError> {
        match self.unsubscribe(principal, chid) {
            Ok(()) | Err(ExecError::NotAvailable(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    /// Channels the principal follows, in subscription order.
    pub fn list(&self, principal: &str) -> Result<Vec<String>, ExecError> {
        Ok(self.load(principal).map_err(tech)?.chids)
    }
}

fn tech(err: StoreError) -> ExecError {
    ExecError::Tech(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn subs() -> SubscriptionStore {
        SubscriptionStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let subs = subs();
        subs.subscribe("alice@example.org", "#news@example.org").unwrap();
        subs.subscribe("alice@example.org", "#news@example.org").unwrap();
        assert_eq!(
            subs.list("alice@example.org").unwrap(),
            vec!["#news@example.org"]
        );
    }

    #[test]
    fn test_unsubscribe_missing_is_not_available() {
        let subs = subs();
        let err = subs
            .unsubscribe("alice@example.org", "#news@example.org")
            .unwrap_err();
        assert!(matches!(err, ExecError::NotAvailable(_)));
    }

    #[test]
    fn test_revoke_swallows_missing() {
        let subs = subs();
        subs.revoke("alice@example.org", "#news@example.org").unwrap();
        subs.subscribe("alice@example.org", "#news@example.org").unwrap();
        subs.revoke("alice@example.org", "#news@example.org").unwrap();
        assert!(subs.list("alice@example.org").unwrap().is_empty());
    }
}
