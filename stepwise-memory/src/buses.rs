//! In-memory command and query buses.
//!
//! Both route by [`Message::name`] and run the handler on the caller's task,
//! so a dispatch completes only after its handler has.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use stepwise::bus::{CommandBus, CommandHandler, QueryBus, QueryHandler};
use stepwise::errors::{BusError, CommandError, QueryError};
use stepwise::types::{Domain, Envelope, Message};
use tracing::{debug, instrument};

/// Name-keyed handler table shared by both buses.
struct Routes<H: ?Sized> {
    handlers: RwLock<HashMap<String, Arc<H>>>,
}

impl<H: ?Sized> Routes<H> {
    fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: &str, handler: Arc<H>) -> Result<(), BusError> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(name) {
            return Err(BusError::DuplicateHandler(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        debug!(name, "handler registered");
        Ok(())
    }

    fn route(&self, name: &str) -> Option<Arc<H>> {
        self.handlers.read().get(name).cloned()
    }

    fn len(&self) -> usize {
        self.handlers.read().len()
    }
}

/// Routes commands to handlers in the same process.
pub struct InMemoryCommandBus<D: Domain> {
    routes: Routes<dyn CommandHandler<D>>,
}

impl<D: Domain> InMemoryCommandBus<D> {
    /// Creates a bus without handlers.
    pub fn new() -> Self {
        Self {
            routes: Routes::new(),
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.routes.len()
    }
}

impl<D: Domain> Default for InMemoryCommandBus<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> CommandBus<D> for InMemoryCommandBus<D> {
    fn register(&self, name: &str, handler: Arc<dyn CommandHandler<D>>) -> Result<(), BusError> {
        self.routes.register(name, handler)
    }

    #[instrument(skip_all, fields(command = command.payload.name(), stream = %command.stream_id))]
    async fn dispatch(&self, command: Envelope<D::Command>) -> Result<(), CommandError> {
        let name = command.payload.name();
        let handler = self
            .routes
            .route(name)
            .ok_or_else(|| CommandError::NoHandler(name.to_string()))?;
        handler.handle(command).await
    }
}

/// Routes queries to handlers in the same process.
pub struct InMemoryQueryBus<D: Domain> {
    routes: Routes<dyn QueryHandler<D>>,
}

impl<D: Domain> InMemoryQueryBus<D> {
    /// Creates a bus without handlers.
    pub fn new() -> Self {
        Self {
            routes: Routes::new(),
        }
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.routes.len()
    }
}

impl<D: Domain> Default for InMemoryQueryBus<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<D: Domain> QueryBus<D> for InMemoryQueryBus<D> {
    fn register(&self, name: &str, handler: Arc<dyn QueryHandler<D>>) -> Result<(), BusError> {
        self.routes.register(name, handler)
    }

    #[instrument(skip_all, fields(query = query.name()))]
    async fn ask(&self, query: &D::Query) -> Result<D::Answer, QueryError> {
        let name = query.name();
        let handler = self
            .routes
            .route(name)
            .ok_or_else(|| QueryError::NoHandler(name.to_string()))?;
        handler.ask(query).await
    }
}
