//! Durable store collaborator boundary.
//!
//! The middleware treats storage as a key/collection document store with
//! find/save/stream operations; engine internals stay behind this seam.
//! - `memory` - in-process implementation used by the runtime and tests

pub mod memory;

use serde_json::{Map, Value};
use thiserror::Error;

pub use memory::MemoryStore;

/// Collection holding channel documents, keyed by chid.
pub const COLLECTION_CHANNELS: &str = "channels";
/// Collection holding the principal -> channels subscription relation.
pub const COLLECTION_SUBSCRIPTIONS: &str = "subscriptions";
/// Audit collection for non-transient commands.
pub const COLLECTION_COMMANDS: &str = "commands";
/// Audit collection for non-transient command results.
pub const COLLECTION_RESULTS: &str = "results";

/// Per-channel message collection name.
pub fn messages_collection(chid: &str) -> String {
    format!("messages:{chid}")
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Top-level field-equality query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    equals: Map<String, Value>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by(field: impl Into<String>, value: Value) -> Self {
        let mut query = Self::default();
        query.equals.insert(field.into(), value);
        query
    }

    pub fn and(mut self, field: impl Into<String>, value: Value) -> Self {
        self.equals.insert(field.into(), value);
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.equals
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

/// Store collaborator contract: named collections of JSON documents.
///
/// `save` upserts by document id; writes to the same id serialize inside the
/// implementation. `stream` returns documents in insertion order.
pub trait DocumentStore: Send + Sync {
    fn save(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError>;

    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError>;

    fn stream(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Box<dyn Iterator<Item = Value> + Send>, StoreError>;
}
