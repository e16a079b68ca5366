//! In-memory event store.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use stepwise::errors::StoreError;
use stepwise::store::{EventStore, ExpectedVersion, StoredEvent};
use stepwise::types::{Envelope, StreamId};
use tracing::trace;

struct Log<E> {
    streams: HashMap<StreamId, Vec<StoredEvent<E>>>,
    all: Vec<StoredEvent<E>>,
}

impl<E> Default for Log<E> {
    fn default() -> Self {
        Self {
            streams: HashMap::new(),
            all: Vec::new(),
        }
    }
}

/// Thread-safe in-memory event store for testing
///
/// Clones share the same storage.
#[derive(Clone)]
pub struct InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    log: Arc<RwLock<Log<E>>>,
}

impl<E> InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    /// Create a new empty in-memory event store
    pub fn new() -> Self {
        Self {
            log: Arc::new(RwLock::new(Log::default())),
        }
    }

    /// Number of events across all streams.
    pub fn len(&self) -> usize {
        self.log.read().all.len()
    }

    /// Whether no event was appended yet.
    pub fn is_empty(&self) -> bool {
        self.log.read().all.is_empty()
    }
}

impl<E> Default for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> EventStore<E> for InMemoryEventStore<E>
where
    E: Send + Sync + Clone + 'static,
{
    async fn append(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<Envelope<E>>,
    ) -> Result<u64, StoreError> {
        let mut log = self.log.write();
        let Log { streams, all } = &mut *log;

        let stream = streams.entry(stream_id.clone()).or_default();
        let current = stream.last().map_or(0, |event| event.version);
        if !expected.admits(current) {
            return Err(StoreError::VersionConflict {
                stream: stream_id.clone(),
                expected: expected.to_string(),
                current,
            });
        }

        let mut version = current;
        let mut position = all.last().map_or(0, |event| event.position);
        for envelope in events {
            version += 1;
            position += 1;
            let stored = StoredEvent {
                position,
                version,
                envelope,
            };
            stream.push(stored.clone());
            all.push(stored);
        }

        trace!(stream = %stream_id, from = current, to = version, "appended events");
        Ok(version)
    }

    async fn read_stream(
        &self,
        stream_id: &StreamId,
        after_version: u64,
    ) -> Result<Vec<StoredEvent<E>>, StoreError> {
        let log = self.log.read();
        Ok(log.streams.get(stream_id).map_or_else(Vec::new, |stream| {
            stream
                .iter()
                .filter(|event| event.version > after_version)
                .cloned()
                .collect()
        }))
    }

    async fn read_all_from(&self, after_position: u64) -> Result<Vec<StoredEvent<E>>, StoreError> {
        let log = self.log.read();
        Ok(log
            .all
            .iter()
            .filter(|event| event.position > after_position)
            .cloned()
            .collect())
    }

    async fn position(&self) -> Result<u64, StoreError> {
        Ok(self.log.read().all.last().map_or(0, |event| event.position))
    }
}
