//! Event-sourced aggregates.
//!
//! An aggregate's state is never stored directly. [`EventSourcedRepository`]
//! rebuilds it from the latest [`Snapshot`] plus the events appended after
//! it, and saving appends the events recorded on an [`AggregateRoot`]
//! (guarded by the version it was loaded at) before publishing them.
//!
//! # Example
//!
//! ```rust,ignore
//! let repository = services.repository::<Account>();
//!
//! let mut account = repository.load("alice").await?;
//! account.record(BankEvent::MoneyDeposited { amount: 100 });
//! repository.save(&mut account).await?;
//! ```

use crate::errors::RepositoryError;
use crate::services::Services;
use crate::store::ExpectedVersion;
use crate::types::{Domain, Envelope, StreamId, Timestamp};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::num::NonZeroU64;
use tracing::{debug, instrument};

/// State rebuilt by folding events.
pub trait Aggregate: Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The event type this aggregate folds.
    type Event: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Stream prefix, e.g. `account` for streams named `account-<id>`.
    const KIND: &'static str;

    /// Folds one event into the state. Must not fail: events are facts.
    fn apply(&mut self, event: &Self::Event);
}

/// The stream holding the events of aggregate `id`.
pub fn stream_for<A: Aggregate>(id: &str) -> Result<StreamId, RepositoryError> {
    StreamId::try_new(format!("{}-{id}", A::KIND))
        .map_err(|_| RepositoryError::InvalidId(id.to_string()))
}

/// A loaded aggregate plus the events recorded on it since loading.
#[derive(Debug, Clone)]
pub struct AggregateRoot<A: Aggregate> {
    id: String,
    stream_id: StreamId,
    version: u64,
    state: A,
    uncommitted: Vec<A::Event>,
}

impl<A: Aggregate> AggregateRoot<A> {
    fn new(id: String, stream_id: StreamId, version: u64, state: A) -> Self {
        Self {
            id,
            stream_id,
            version,
            state,
            uncommitted: Vec::new(),
        }
    }

    /// Applies `event` to the state and queues it for the next save.
    pub fn record(&mut self, event: A::Event) {
        self.state.apply(&event);
        self.uncommitted.push(event);
    }

    /// The aggregate id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The aggregate's stream.
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// The stream version the state reflects, excluding uncommitted events.
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// The current state, including uncommitted events.
    pub const fn state(&self) -> &A {
        &self.state
    }

    /// Events recorded since loading.
    pub fn uncommitted(&self) -> &[A::Event] {
        &self.uncommitted
    }

    /// Whether the stream had any events when loaded.
    pub const fn exists(&self) -> bool {
        self.version > 0
    }
}

/// Serialized aggregate state at a stream version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The aggregate's stream
    pub stream_id: StreamId,
    /// The stream version the state reflects
    pub version: u64,
    /// The serialized state
    pub state: serde_json::Value,
    /// Scenario time the snapshot was taken
    pub taken_at: Timestamp,
}

/// Storage for aggregate snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores `snapshot`, replacing older ones of the same stream.
    async fn save(&self, snapshot: Snapshot) -> Result<(), RepositoryError>;

    /// The most recent snapshot of `stream_id`.
    async fn latest(&self, stream_id: &StreamId) -> Result<Option<Snapshot>, RepositoryError>;
}

/// When [`EventSourcedRepository::save`] writes a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotPolicy {
    /// Never snapshot.
    #[default]
    Never,
    /// Snapshot whenever a save crosses a multiple of this many events.
    Every(NonZeroU64),
}

impl SnapshotPolicy {
    /// Whether moving a stream from version `from` to `to` calls for a
    /// snapshot.
    pub const fn is_due(self, from: u64, to: u64) -> bool {
        match self {
            Self::Never => false,
            Self::Every(interval) => from / interval.get() != to / interval.get(),
        }
    }
}

/// Loads and saves aggregates of type `A` through a domain's services.
pub struct EventSourcedRepository<A, D>
where
    A: Aggregate<Event = D::Event>,
    D: Domain,
{
    services: Services<D>,
    policy: SnapshotPolicy,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A, D> EventSourcedRepository<A, D>
where
    A: Aggregate<Event = D::Event>,
    D: Domain,
{
    /// Creates a repository that never snapshots.
    pub fn new(services: Services<D>) -> Self {
        Self {
            services,
            policy: SnapshotPolicy::Never,
            _aggregate: PhantomData,
        }
    }

    /// Sets the snapshot policy.
    #[must_use]
    pub const fn with_snapshots(mut self, policy: SnapshotPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rebuilds aggregate `id` from its latest snapshot and later events.
    /// An aggregate without events loads as `A::default()` at version 0.
    #[instrument(skip(self), fields(kind = A::KIND))]
    pub async fn load(&self, id: &str) -> Result<AggregateRoot<A>, RepositoryError> {
        let stream_id = stream_for::<A>(id)?;

        let (mut state, mut version) = match self.services.snapshots.latest(&stream_id).await? {
            Some(snapshot) => (serde_json::from_value::<A>(snapshot.state)?, snapshot.version),
            None => (A::default(), 0),
        };

        let events = self
            .services
            .event_store
            .read_stream(&stream_id, version)
            .await?;
        debug!(from_version = version, replayed = events.len(), "loaded aggregate");
        for stored in events {
            state.apply(&stored.envelope.payload);
            version = stored.version;
        }

        Ok(AggregateRoot::new(id.to_string(), stream_id, version, state))
    }

    /// Appends the root's uncommitted events, snapshots if due, then
    /// publishes the appended events. Saving a root with nothing recorded
    /// does nothing.
    #[instrument(skip(self, root), fields(kind = A::KIND, id = %root.id))]
    pub async fn save(&self, root: &mut AggregateRoot<A>) -> Result<(), RepositoryError> {
        if root.uncommitted.is_empty() {
            return Ok(());
        }

        let envelopes: Vec<Envelope<D::Event>> = root
            .uncommitted
            .iter()
            .cloned()
            .map(|event| Envelope::stamp(root.stream_id.clone(), event, &self.services.clock))
            .collect();
        let expected = if root.exists() {
            ExpectedVersion::Exact(root.version)
        } else {
            ExpectedVersion::NoStream
        };

        let new_version = self
            .services
            .event_store
            .append(&root.stream_id, expected, envelopes.clone())
            .await?;

        if self.policy.is_due(root.version, new_version) {
            self.services
                .snapshots
                .save(Snapshot {
                    stream_id: root.stream_id.clone(),
                    version: new_version,
                    state: serde_json::to_value(&root.state)?,
                    taken_at: self.services.clock.now(),
                })
                .await?;
            debug!(version = new_version, "snapshot written");
        }

        root.version = new_version;
        root.uncommitted.clear();

        self.services.event_bus.publish(envelopes).await?;
        Ok(())
    }
}
