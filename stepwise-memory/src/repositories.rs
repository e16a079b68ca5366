//! In-memory snapshot and read model storage.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use stepwise::errors::RepositoryError;
use stepwise::read_model::ReadModelRepository;
use stepwise::repository::{Snapshot, SnapshotStore};
use stepwise::types::StreamId;

/// Keeps the latest snapshot per stream.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<RwLock<HashMap<StreamId, Snapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: Snapshot) -> Result<(), RepositoryError> {
        let mut snapshots = self.snapshots.write();
        let newer = snapshots
            .get(&snapshot.stream_id)
            .map_or(true, |existing| existing.version <= snapshot.version);
        if newer {
            snapshots.insert(snapshot.stream_id.clone(), snapshot);
        }
        Ok(())
    }

    async fn latest(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, RepositoryError> {
        Ok(self.snapshots.read().get(stream_id).cloned())
    }
}

/// JSON documents grouped by collection, ordered by id.
#[derive(Clone, Default)]
pub struct InMemoryReadModelRepository {
    collections: Arc<RwLock<BTreeMap<String, BTreeMap<String, Value>>>>,
}

impl InMemoryReadModelRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl ReadModelRepository for InMemoryReadModelRepository {
    async fn upsert(&self, collection: &str, id: &str, document: Value) -> Result<(), RepositoryError> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), document);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        if let Some(documents) = self.collections.write().get_mut(collection) {
            documents.remove(id);
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<(String, Value)>, RepositoryError> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, document)| (id.clone(), document.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }
}
