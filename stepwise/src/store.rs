//! Event store interface.

use crate::errors::StoreError;
use crate::types::{Envelope, StreamId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The version a writer expects a stream to be at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpectedVersion {
    /// No check.
    Any,
    /// The stream must not exist yet.
    NoStream,
    /// The stream must contain exactly this many events.
    Exact(u64),
}

impl ExpectedVersion {
    /// Whether a stream currently at `current` satisfies this expectation.
    pub const fn admits(self, current: u64) -> bool {
        match self {
            Self::Any => true,
            Self::NoStream => current == 0,
            Self::Exact(expected) => expected == current,
        }
    }
}

impl fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("any version"),
            Self::NoStream => f.write_str("no stream"),
            Self::Exact(version) => write!(f, "exactly {version}"),
        }
    }
}

/// An event as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent<E> {
    /// Position in the global log, starting at 1
    pub position: u64,
    /// Version within its stream, starting at 1
    pub version: u64,
    /// The event and its metadata
    pub envelope: Envelope<E>,
}

/// Append-only event storage with optimistic concurrency.
#[async_trait]
pub trait EventStore<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    /// Appends `events` to `stream_id` if its version satisfies `expected`.
    /// Returns the stream's new version.
    async fn append(
        &self,
        stream_id: &StreamId,
        expected: ExpectedVersion,
        events: Vec<Envelope<E>>,
    ) -> Result<u64, StoreError>;

    /// Events of `stream_id` with a version above `after_version`.
    async fn read_stream(
        &self,
        stream_id: &StreamId,
        after_version: u64,
    ) -> Result<Vec<StoredEvent<E>>, StoreError>;

    /// Events of all streams with a global position above `after_position`.
    async fn read_all_from(&self, after_position: u64) -> Result<Vec<StoredEvent<E>>, StoreError>;

    /// Position of the most recently appended event, 0 when empty.
    async fn position(&self) -> Result<u64, StoreError>;
}
