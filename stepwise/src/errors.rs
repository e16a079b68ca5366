//! Error types for stepwise.
//!
//! Errors are split by subsystem, following the same layering as the rest of
//! the crate:
//!
//! - **`StepError`**: the boxed error a failing step hands back to the test.
//!   It is always the *original* error (a `CommandError`, a listener's own
//!   error type, a `HarnessError`, ...) so tests can `downcast_ref` it.
//! - **`HarnessError`**: failures raised by the scheduler itself.
//! - **`ConfigError`**: invalid configuration, returned synchronously at
//!   construction and never queued as a step.
//! - **`CommandError`** / **`QueryError`** / **`BusError`**: bus failures.
//! - **`StoreError`** / **`RepositoryError`**: storage failures.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use stepwise::errors::{CommandError, StepError};
//!
//! let result: Result<_, StepError> = scenario.await;
//! if let Err(error) = result {
//!     if let Some(CommandError::Rejected(reason)) = error.downcast_ref::<CommandError>() {
//!         eprintln!("command rejected: {reason}");
//!     }
//! }
//! ```

use crate::types::StreamId;
use thiserror::Error;

/// The error type carried by failing steps.
///
/// Boxing keeps the concrete error intact: whatever a step, handler or
/// listener returned is exactly what surfaces from the scenario.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for step actions and checkpoints.
pub type StepResult<T = ()> = Result<T, StepError>;

/// Failures raised by the scheduler itself rather than by a step.
#[derive(Debug, Clone, Error)]
pub enum HarnessError {
    /// A step was expected to fail but completed successfully.
    #[error("expected step `{step}` to fail with {expected}, but it succeeded")]
    MissingFailure {
        /// Description of the step that succeeded
        step: String,
        /// Rendering of the expected error
        expected: String,
    },

    /// A step failed, but not in the expected way.
    #[error("expected step `{step}` to fail with {expected}, but it failed with: {actual}")]
    UnexpectedFailure {
        /// Description of the step that failed
        step: String,
        /// Rendering of the expected error
        expected: String,
        /// Message of the error that actually occurred
        actual: String,
    },

    /// A failure expectation was armed but no step followed it.
    #[error("expected the next step to fail with {expected}, but no step followed")]
    UnconsumedExpectation {
        /// Rendering of the expected error
        expected: String,
    },

    /// Steps kept registering nested steps past the configured limit.
    #[error("steps nested deeper than the drain depth limit of {limit}")]
    DrainDepthExceeded {
        /// The configured maximum nesting depth
        limit: usize,
    },

    /// The scenario was awaited while another await of it was still running.
    #[error("the scenario is already running; await it from one place at a time")]
    AlreadyRunning,

    /// A `then_*` assertion did not hold.
    #[error("assertion `{step}` failed\n  expected: {expected}\n    actual: {actual}")]
    AssertionFailed {
        /// Label of the assertion step
        step: String,
        /// Debug rendering of the expected value
        expected: String,
        /// Debug rendering of the actual value
        actual: String,
    },
}

/// Invalid configuration detected while building a scenario.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A timestamp could not be parsed as RFC 3339.
    #[error("invalid timestamp '{input}': {reason}")]
    InvalidTimestamp {
        /// The rejected input
        input: String,
        /// Why parsing failed
        reason: String,
    },

    /// A stream identifier was empty or too long.
    #[error("invalid stream id '{0}'")]
    InvalidStreamId(String),

    /// A numeric or textual setting was out of range.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// The configuration key
        key: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Errors that can occur while dispatching or handling a command.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// No handler is registered for the command.
    #[error("no handler registered for command '{0}'")]
    NoHandler(String),

    /// The handler rejected the command because a business rule was violated.
    #[error("{0}")]
    Rejected(String),

    /// Loading or saving the target aggregate failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Publishing the resulting events failed.
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

/// Errors that can occur while answering a query.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// No handler is registered for the query.
    #[error("no handler registered for query '{0}'")]
    NoHandler(String),

    /// The requested read model does not exist.
    #[error("read model '{collection}/{id}' not found")]
    NotFound {
        /// The read model collection
        collection: String,
        /// The document identifier
        id: String,
    },

    /// Reading the backing read model failed.
    #[error("read model error: {0}")]
    ReadModel(String),
}

/// Errors raised by bus registration or publication.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// A handler is already registered under this name.
    #[error("a handler is already registered for '{0}'")]
    DuplicateHandler(String),

    /// The bus has shut down and can no longer deliver messages.
    #[error("event bus closed")]
    Closed,
}

/// Errors that can occur when interacting with the event store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The stream's current version did not match the expected version.
    #[error("version conflict on stream '{stream}': expected {expected}, but current is {current}")]
    VersionConflict {
        /// The stream with the version conflict
        stream: StreamId,
        /// The version the writer expected
        expected: String,
        /// The actual current version
        current: u64,
    },

    /// An unexpected internal error occurred.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Errors that can occur when loading or saving aggregates and snapshots.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// The event store rejected the operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A snapshot or read model could not be (de)serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The aggregate identifier does not form a valid stream id.
    #[error("invalid aggregate id '{0}'")]
    InvalidId(String),

    /// Saved events could not be published.
    #[error("publishing saved events failed: {0}")]
    Publish(#[from] BusError),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        Self::Repository(RepositoryError::Store(error))
    }
}
