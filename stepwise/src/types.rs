//! Core message and time types.
//!
//! Identifiers use smart constructors so that an invalid stream id can never
//! reach a bus or a store. Every message the harness dispatches is wrapped in
//! an [`Envelope`] stamped with the scenario's [`Clock`], which makes message
//! timestamps deterministic and controllable from a test.

use crate::errors::ConfigError;
use chrono::{DateTime, TimeDelta, Utc};
use nutype::nutype;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A stream identifier, usually `<aggregate-kind>-<id>`.
///
/// `StreamId` values are trimmed, non-empty and at most 255 characters.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 255),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct StreamId(String);

impl StreamId {
    /// Parses a stream id, reporting failures as a configuration error.
    pub fn parse(value: impl Into<String>) -> Result<Self, ConfigError> {
        let value = value.into();
        Self::try_new(value.clone()).map_err(|_| ConfigError::InvalidStreamId(value))
    }
}

/// A globally unique message identifier in `UUIDv7` format.
#[nutype(
    validate(predicate = |id: &Uuid| id.get_version() == Some(uuid::Version::SortRand)),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Hash,
        AsRef,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message id.
    pub fn new() -> Self {
        // Uuid::now_v7() always yields a version 7 UUID
        Self::try_new(Uuid::now_v7()).expect("Uuid::now_v7() should always return a valid v7 UUID")
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

/// A point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a new timestamp from a UTC `DateTime`.
    pub const fn new(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parses an RFC 3339 timestamp such as `2024-03-01T09:30:00Z`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        DateTime::parse_from_rfc3339(input.trim())
            .map(|parsed| Self(parsed.with_timezone(&Utc)))
            .map_err(|error| ConfigError::InvalidTimestamp {
                input: input.to_string(),
                reason: error.to_string(),
            })
    }

    /// Returns this timestamp moved forward by `by`, saturating at the
    /// latest representable instant.
    #[must_use]
    pub fn advance(self, by: Duration) -> Self {
        let advanced = TimeDelta::from_std(by)
            .ok()
            .and_then(|delta| self.0.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self(advanced)
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::new(datetime)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// The scenario's notion of "now".
///
/// Cloned handles share the same instant, so a step that advances the clock
/// is observed by every bus and repository stamping messages afterwards.
#[derive(Debug, Clone)]
pub struct Clock {
    current: Arc<Mutex<Timestamp>>,
}

impl Clock {
    /// Creates a clock frozen at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Returns the current instant.
    pub fn now(&self) -> Timestamp {
        *self.current.lock()
    }

    /// Moves the clock to `instant`.
    pub fn set(&self, instant: Timestamp) {
        *self.current.lock() = instant;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock();
        *current = current.advance(by);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::starting_at(Timestamp::now())
    }
}

/// A message with a routing name.
///
/// Buses route commands and queries to handlers by this name, so every
/// variant of a command enum normally returns a distinct name.
pub trait Message {
    /// The routing name of this message.
    fn name(&self) -> &'static str;
}

/// The message types of one bounded context.
pub trait Domain: Send + Sync + 'static {
    /// Commands dispatched on the command bus.
    type Command: Message + Clone + Debug + Send + Sync + 'static;
    /// Events appended to the store and published on the event bus.
    type Event: Message + Clone + Debug + PartialEq + Send + Sync + 'static;
    /// Queries answered by the query bus.
    type Query: Message + Clone + Debug + Send + Sync + 'static;
    /// Answers produced by query handlers.
    type Answer: Clone + Debug + PartialEq + Send + Sync + 'static;
}

/// A message payload plus the metadata the harness stamps on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Unique id of this message
    pub message_id: MessageId,
    /// The stream (aggregate) the message targets
    pub stream_id: StreamId,
    /// The scenario time at which the message was created
    pub timestamp: Timestamp,
    /// The message itself
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Wraps `payload`, stamping it with the clock's current time.
    pub fn stamp(stream_id: StreamId, payload: T, clock: &Clock) -> Self {
        Self {
            message_id: MessageId::new(),
            stream_id,
            timestamp: clock.now(),
            payload,
        }
    }
}
