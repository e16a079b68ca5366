//! Bus interfaces.
//!
//! The harness drives an application through three buses. Commands and
//! queries are answered synchronously with respect to the step dispatching
//! them; events are delivered asynchronously, which is why every step ends
//! with a checkpoint waiting for the event bus to go idle.

use crate::engine::IdleSignal;
use crate::errors::{BusError, CommandError, QueryError, StepResult};
use crate::types::{Domain, Envelope};
use async_trait::async_trait;
use std::sync::Arc;

/// Reacts to published events: projections, process managers, policies.
#[async_trait]
pub trait EventListener<E>: Send + Sync
where
    E: Send + Sync + 'static,
{
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Handles one event. An error here is reported to the scenario's error
    /// channel and fails the next checkpoint.
    async fn on_event(&self, event: &Envelope<E>) -> StepResult;
}

/// Publishes events to subscribed listeners.
#[async_trait]
pub trait EventBus<E>: IdleSignal
where
    E: Send + Sync + 'static,
{
    /// Hands `events` to every subscriber, in order. Returns before the
    /// listeners have run.
    async fn publish(&self, events: Vec<Envelope<E>>) -> Result<(), BusError>;

    /// Adds a listener receiving every event published afterwards.
    fn subscribe(&self, listener: Arc<dyn EventListener<E>>);
}

/// Handles one kind of command.
#[async_trait]
pub trait CommandHandler<D: Domain>: Send + Sync {
    /// Executes `command`.
    async fn handle(&self, command: Envelope<D::Command>) -> Result<(), CommandError>;
}

/// Routes commands to their handlers by message name.
#[async_trait]
pub trait CommandBus<D: Domain>: Send + Sync {
    /// Registers the handler for commands named `name`.
    fn register(&self, name: &str, handler: Arc<dyn CommandHandler<D>>) -> Result<(), BusError>;

    /// Dispatches `command` and waits for its handler.
    async fn dispatch(&self, command: Envelope<D::Command>) -> Result<(), CommandError>;
}

/// Answers one kind of query.
#[async_trait]
pub trait QueryHandler<D: Domain>: Send + Sync {
    /// Answers `query`.
    async fn ask(&self, query: &D::Query) -> Result<D::Answer, QueryError>;
}

/// Routes queries to their handlers by message name.
#[async_trait]
pub trait QueryBus<D: Domain>: Send + Sync {
    /// Registers the handler for queries named `name`.
    fn register(&self, name: &str, handler: Arc<dyn QueryHandler<D>>) -> Result<(), BusError>;

    /// Asks `query` and waits for the answer.
    async fn ask(&self, query: &D::Query) -> Result<D::Answer, QueryError>;
}

/// Exposes an event bus as the idle signal checkpoints wait on.
pub struct BusIdleSignal<E> {
    bus: Arc<dyn EventBus<E>>,
}

impl<E> BusIdleSignal<E>
where
    E: Send + Sync + 'static,
{
    /// Wraps `bus`.
    pub fn new(bus: Arc<dyn EventBus<E>>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl<E> IdleSignal for BusIdleSignal<E>
where
    E: Send + Sync + 'static,
{
    async fn until_idle(&self) {
        self.bus.until_idle().await;
    }
}
