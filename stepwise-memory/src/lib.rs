//! In-memory collaborators for `stepwise` scenarios
//!
//! This crate provides in-process implementations of every collaborator a
//! [`Scenario`] drives: an event bus whose listeners run on background
//! tasks, command and query buses, an event store, and snapshot and read
//! model storage. [`in_memory_scenario`] wires them together.
//!
//! ```rust,ignore
//! use stepwise_memory::in_memory_scenario;
//!
//! in_memory_scenario::<Bank>(ScenarioConfig::default())
//!     .given_listener(Provider::with_dependencies(BalanceProjection::new))
//!     .when_event(alice_stream, deposited)
//!     .then_read_model("balances", "alice", expected_balance)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

pub mod buses;
pub mod event_bus;
pub mod event_store;
pub mod repositories;

pub use buses::{InMemoryCommandBus, InMemoryQueryBus};
pub use event_bus::{InMemoryEventBus, ListenerPanicked};
pub use event_store::InMemoryEventStore;
pub use repositories::{InMemoryReadModelRepository, InMemorySnapshotStore};

use std::sync::Arc;
use stepwise::config::ScenarioConfig;
use stepwise::engine::{ErrorCallback, ErrorChannel};
use stepwise::read_model::ReadModels;
use stepwise::scenario::Scenario;
use stepwise::services::Services;
use stepwise::types::{Clock, Domain};

/// The in-memory collaborators of one domain, with their concrete types.
pub struct InMemoryServices<D: Domain> {
    /// The scenario clock
    pub clock: Clock,
    /// Event storage
    pub event_store: Arc<InMemoryEventStore<D::Event>>,
    /// Event publication
    pub event_bus: Arc<InMemoryEventBus<D::Event>>,
    /// Command routing
    pub command_bus: Arc<InMemoryCommandBus<D>>,
    /// Query routing
    pub query_bus: Arc<InMemoryQueryBus<D>>,
    /// Aggregate snapshots
    pub snapshots: Arc<InMemorySnapshotStore>,
    /// Read model documents
    pub read_models: Arc<InMemoryReadModelRepository>,
}

impl<D: Domain> InMemoryServices<D> {
    /// Builds empty collaborators. Listener failures go to `on_error`.
    pub fn build(clock: Clock, on_error: ErrorCallback) -> Self {
        Self {
            clock,
            event_store: Arc::new(InMemoryEventStore::new()),
            event_bus: Arc::new(InMemoryEventBus::new(on_error)),
            command_bus: Arc::new(InMemoryCommandBus::new()),
            query_bus: Arc::new(InMemoryQueryBus::new()),
            snapshots: Arc::new(InMemorySnapshotStore::new()),
            read_models: Arc::new(InMemoryReadModelRepository::new()),
        }
    }

    /// The collaborators behind their traits.
    pub fn services(&self) -> Services<D> {
        Services {
            clock: self.clock.clone(),
            event_store: self.event_store.clone(),
            event_bus: self.event_bus.clone(),
            command_bus: self.command_bus.clone(),
            query_bus: self.query_bus.clone(),
            snapshots: self.snapshots.clone(),
            read_models: ReadModels::new(self.read_models.clone()),
        }
    }
}

/// A scenario over fresh in-memory collaborators.
pub fn in_memory_scenario<D: Domain>(config: ScenarioConfig) -> Scenario<D> {
    let errors = ErrorChannel::new();
    let services = InMemoryServices::<D>::build(Clock::default(), errors.reporter());
    Scenario::new(config, services.services(), errors)
}
