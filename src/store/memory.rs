use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;

use super::{DocumentStore, Query, StoreError};

/// In-process document store.
///
/// Each collection is an insertion-ordered vector of `(id, document)` pairs;
/// saving an existing id replaces the document in place, so replay order
/// stays stable across updates. Writes to a collection serialize on its
/// lock, reads clone out of it.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(String, Value)>>>,
    /// When set, every operation fails; used to exercise TECH_ERROR paths.
    poisoned: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with the given diagnostic.
    pub fn poison(&self, diagnostic: impl Into<String>) {
        *self.poisoned.write() = Some(diagnostic.into());
    }

    pub fn heal(&self) {
        *self.poisoned.write() = None;
    }

    fn check(&self) -> Result<(), StoreError> {
        match self.poisoned.read().as_ref() {
            Some(diagnostic) => Err(StoreError::Backend(diagnostic.clone())),
            None => Ok(()),
        }
    }

    /// Number of documents currently held in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, Vec::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl DocumentStore for MemoryStore {
    fn save(&self, collection: &str, id: &str, document: Value) -> Result<(), StoreError> {
        self.check()?;
        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, slot)) => *slot = document,
            None => docs.push((id.to_string(), document)),
        }
        Ok(())
    }

    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        self.check()?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| query.matches(doc))
                    .map(|(_, doc)| doc.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn stream(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Box<dyn Iterator<Item = Value> + Send>, StoreError> {
        let matched = self.find(collection, query)?;
        Ok(Box::new(matched.into_iter()))
    }
}
