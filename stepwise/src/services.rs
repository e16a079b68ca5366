//! The collaborators a scenario drives, and how handlers get built from them.

use crate::bus::{CommandBus, EventBus, QueryBus};
use crate::errors::CommandError;
use crate::read_model::ReadModels;
use crate::repository::{Aggregate, EventSourcedRepository, SnapshotStore};
use crate::store::EventStore;
use crate::types::{Clock, Domain, Envelope, StreamId};
use std::sync::Arc;

/// Everything a scenario, a handler or a listener may need.
///
/// Cloning is cheap: every collaborator is shared.
pub struct Services<D: Domain> {
    /// The scenario clock used to stamp messages
    pub clock: Clock,
    /// Event storage
    pub event_store: Arc<dyn EventStore<D::Event>>,
    /// Event publication
    pub event_bus: Arc<dyn EventBus<D::Event>>,
    /// Command routing
    pub command_bus: Arc<dyn CommandBus<D>>,
    /// Query routing
    pub query_bus: Arc<dyn QueryBus<D>>,
    /// Aggregate snapshots
    pub snapshots: Arc<dyn SnapshotStore>,
    /// Read model documents
    pub read_models: ReadModels,
}

impl<D: Domain> Services<D> {
    /// A repository for aggregates of type `A`.
    pub fn repository<A>(&self) -> EventSourcedRepository<A, D>
    where
        A: Aggregate<Event = D::Event>,
    {
        EventSourcedRepository::new(self.clone())
    }

    /// Stamps `command` with the current time and dispatches it.
    pub async fn dispatch(&self, stream_id: StreamId, command: D::Command) -> Result<(), CommandError> {
        let envelope = Envelope::stamp(stream_id, command, &self.clock);
        self.command_bus.dispatch(envelope).await
    }
}

impl<D: Domain> Clone for Services<D> {
    fn clone(&self) -> Self {
        Self {
            clock: self.clock.clone(),
            event_store: Arc::clone(&self.event_store),
            event_bus: Arc::clone(&self.event_bus),
            command_bus: Arc::clone(&self.command_bus),
            query_bus: Arc::clone(&self.query_bus),
            snapshots: Arc::clone(&self.snapshots),
            read_models: self.read_models.clone(),
        }
    }
}

impl<D: Domain> std::fmt::Debug for Services<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// How a handler or listener registered with a scenario is obtained.
///
/// The variant is chosen by the caller rather than detected at runtime:
///
/// ```rust,ignore
/// scenario
///     .given_listener(Provider::value(AuditLog::default()))
///     .given_listener(Provider::factory(AuditLog::default))
///     .given_listener(Provider::with_dependencies(|services| {
///         BalanceProjection::new(services.read_models.clone())
///     }));
/// ```
pub enum Provider<T, D: Domain> {
    /// An already built instance.
    Value(Arc<T>),
    /// Built when the registering step runs.
    Factory(Box<dyn FnOnce() -> T + Send>),
    /// Built from the scenario's services when the registering step runs.
    WithDependencies(Box<dyn FnOnce(&Services<D>) -> T + Send>),
}

impl<T, D: Domain> Provider<T, D> {
    /// Provides `instance` as is.
    pub fn value(instance: T) -> Self {
        Self::Value(Arc::new(instance))
    }

    /// Provides whatever `factory` builds.
    pub fn factory(factory: impl FnOnce() -> T + Send + 'static) -> Self {
        Self::Factory(Box::new(factory))
    }

    /// Provides whatever `build` makes of the scenario's services.
    pub fn with_dependencies(build: impl FnOnce(&Services<D>) -> T + Send + 'static) -> Self {
        Self::WithDependencies(Box::new(build))
    }

    /// The variant name, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Factory(_) => "factory",
            Self::WithDependencies(_) => "with dependencies",
        }
    }

    /// Produces the instance.
    pub fn resolve(self, services: &Services<D>) -> Arc<T> {
        match self {
            Self::Value(instance) => instance,
            Self::Factory(factory) => Arc::new(factory()),
            Self::WithDependencies(build) => Arc::new(build(services)),
        }
    }
}

impl<T, D: Domain> std::fmt::Debug for Provider<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Provider").field(&self.kind()).finish()
    }
}
