//! `stepwise` - behavior testing for event-sourced and CQRS applications
//!
//! A test registers given/when/then steps on a [`Scenario`] and awaits it.
//! The steps run one at a time against a command bus, a query bus and an
//! event bus. A step that registers further steps while running has them run
//! before its next sibling, and every step ends with a checkpoint that waits
//! for the event bus to go idle and surfaces any error an asynchronous
//! listener reported meanwhile.
//!
//! The engine lives in [`engine`]; the collaborator traits in [`bus`],
//! [`store`], [`repository`] and [`read_model`]; in-memory implementations
//! are provided by the `stepwise-memory` crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod config;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod read_model;
pub mod repository;
pub mod scenario;
pub mod services;
pub mod store;
pub mod types;

pub use bus::{CommandBus, CommandHandler, EventBus, EventListener, QueryBus, QueryHandler};
pub use config::{DebugMode, ScenarioConfig};
pub use engine::{ErrorChannel, ErrorMatcher, IdleSignal, Scheduler};
pub use errors::{
    BusError, CommandError, ConfigError, HarnessError, QueryError, RepositoryError, StepError,
    StepResult, StoreError,
};
pub use read_model::{ReadModelRepository, ReadModels};
pub use repository::{Aggregate, AggregateRoot, EventSourcedRepository, SnapshotPolicy, SnapshotStore};
pub use scenario::Scenario;
pub use services::{Provider, Services};
pub use store::{EventStore, ExpectedVersion, StoredEvent};
pub use types::{Clock, Domain, Envelope, Message, MessageId, StreamId, Timestamp};
