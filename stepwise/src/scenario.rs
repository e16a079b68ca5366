//! The given/when/then surface.
//!
//! A [`Scenario`] registers one step per call and runs nothing until it is
//! awaited. Steps run strictly one after another; after each one the
//! scenario waits for the event bus to go idle, so a `then_*` assertion
//! always observes every projection triggered by the steps before it.
//!
//! # Example
//!
//! ```rust,ignore
//! use stepwise::Scenario;
//!
//! in_memory_scenario::<Bank>(ScenarioConfig::default())
//!     .given_time("2024-03-01T09:00:00Z")?
//!     .given_command_handler("Deposit", Provider::with_dependencies(DepositHandler::new))
//!     .given_events(alice.clone(), vec![BankEvent::opened("alice")])
//!     .when_command(alice, BankCommand::deposit("alice", 100))
//!     .then_events(vec![BankEvent::deposited("alice", 100)])
//!     .await?;
//! ```

use crate::bus::{BusIdleSignal, CommandHandler, EventListener, QueryHandler};
use crate::config::ScenarioConfig;
use crate::engine::{BreakpointHook, ErrorChannel, ErrorMatcher, IdleSynchronizer, Scheduler};
use crate::errors::{ConfigError, HarnessError, StepError, StepResult};
use crate::services::{Provider, Services};
use crate::store::ExpectedVersion;
use crate::types::{Domain, Envelope, Message, StreamId, Timestamp};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A behavior test against one domain's collaborators.
///
/// Every method registers a step and returns the scenario, so a whole test
/// reads as one chain that is awaited at the end. Awaiting resolves to the
/// scenario itself; awaiting it again without registering anything new is a
/// no-op.
pub struct Scenario<D: Domain> {
    scheduler: Scheduler,
    services: Services<D>,
    mark: Arc<Mutex<u64>>,
}

impl<D: Domain> Scenario<D> {
    /// Creates a scenario over `services`.
    ///
    /// `errors` must be the channel whose reporter the event bus was built
    /// with; its entries fail the checkpoint following the step that caused
    /// them.
    pub fn new(config: ScenarioConfig, services: Services<D>, errors: ErrorChannel) -> Self {
        if let Some(start) = config.start_time() {
            services.clock.set(start);
        }
        let idle = BusIdleSignal::new(Arc::clone(&services.event_bus));
        let synchronizer = IdleSynchronizer::new(Arc::new(idle), errors);

        Self {
            scheduler: Scheduler::new(config, synchronizer),
            services,
            mark: Arc::new(Mutex::new(0)),
        }
    }

    /// The collaborators this scenario drives.
    pub const fn services(&self) -> &Services<D> {
        &self.services
    }

    /// The underlying scheduler.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Replaces what an armed breakpoint does when debugging is enabled.
    #[must_use]
    pub fn with_breakpoint_hook(self, hook: BreakpointHook) -> Self {
        self.scheduler.set_breakpoint_hook(hook);
        self
    }

    #[track_caller]
    fn register<F, Fut>(&self, operation: &'static str, label: Option<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.scheduler.register(operation, label, action);
        self.clone()
    }

    /// Sets the scenario clock to `instant` (RFC 3339).
    ///
    /// The instant is parsed right away; an invalid one is returned as an
    /// error instead of being queued.
    #[track_caller]
    pub fn given_time(&self, instant: &str) -> Result<Self, ConfigError> {
        let instant = Timestamp::parse(instant)?;
        let clock = self.services.clock.clone();
        Ok(self.register(
            "Scenario::given_time",
            Some(instant.to_string()),
            move || async move {
                clock.set(instant);
                Ok(())
            },
        ))
    }

    /// Moves the scenario clock forward.
    #[track_caller]
    pub fn advance_time(&self, by: Duration) -> Self {
        let clock = self.services.clock.clone();
        self.register("Scenario::advance_time", Some(format!("{by:?}")), move || async move {
            clock.advance(by);
            Ok(())
        })
    }

    /// Registers the handler for commands named `name`.
    #[track_caller]
    pub fn given_command_handler<H>(&self, name: &'static str, provider: Provider<H, D>) -> Self
    where
        H: CommandHandler<D> + 'static,
    {
        let services = self.services.clone();
        self.register(
            "Scenario::given_command_handler",
            Some(name.to_string()),
            move || async move {
                let handler: Arc<dyn CommandHandler<D>> = provider.resolve(&services);
                services.command_bus.register(name, handler)?;
                Ok(())
            },
        )
    }

    /// Registers the handler for queries named `name`.
    #[track_caller]
    pub fn given_query_handler<H>(&self, name: &'static str, provider: Provider<H, D>) -> Self
    where
        H: QueryHandler<D> + 'static,
    {
        let services = self.services.clone();
        self.register(
            "Scenario::given_query_handler",
            Some(name.to_string()),
            move || async move {
                let handler: Arc<dyn QueryHandler<D>> = provider.resolve(&services);
                services.query_bus.register(name, handler)?;
                Ok(())
            },
        )
    }

    /// Subscribes a listener to the event bus.
    #[track_caller]
    pub fn given_listener<L>(&self, provider: Provider<L, D>) -> Self
    where
        L: EventListener<D::Event> + 'static,
    {
        let services = self.services.clone();
        self.register(
            "Scenario::given_listener",
            Some(short_type_name::<L>().to_string()),
            move || async move {
                let listener: Arc<dyn EventListener<D::Event>> = provider.resolve(&services);
                debug!(listener = listener.name(), "subscribing listener");
                services.event_bus.subscribe(listener);
                Ok(())
            },
        )
    }

    /// Appends `events` to `stream_id` and publishes them.
    #[track_caller]
    pub fn given_events(&self, stream_id: StreamId, events: Vec<D::Event>) -> Self {
        let services = self.services.clone();
        self.register(
            "Scenario::given_events",
            Some(format!("{stream_id}: {}", event_names::<D>(&events))),
            move || async move { append_and_publish(&services, &stream_id, events).await },
        )
    }

    /// Dispatches `command`. Events appended from here on are what the
    /// next `then_events` inspects.
    #[track_caller]
    pub fn when_command(&self, stream_id: StreamId, command: D::Command) -> Self {
        let services = self.services.clone();
        let mark = Arc::clone(&self.mark);
        self.register(
            "Scenario::when_command",
            Some(command.name().to_string()),
            move || async move {
                let position = services.event_store.position().await?;
                *mark.lock() = position;
                debug!(command = command.name(), stream = %stream_id, "dispatching command");
                services.dispatch(stream_id, command).await?;
                Ok(())
            },
        )
    }

    /// Appends and publishes `event` as if some other part of the system
    /// had. Events appended from here on are what the next `then_events`
    /// inspects, including `event` itself.
    #[track_caller]
    pub fn when_event(&self, stream_id: StreamId, event: D::Event) -> Self {
        let services = self.services.clone();
        let mark = Arc::clone(&self.mark);
        self.register(
            "Scenario::when_event",
            Some(event.name().to_string()),
            move || async move {
                let position = services.event_store.position().await?;
                *mark.lock() = position;
                append_and_publish(&services, &stream_id, vec![event]).await
            },
        )
    }

    /// Asserts the events appended since the last `when_*` step, in order.
    #[track_caller]
    pub fn then_events(&self, expected: Vec<D::Event>) -> Self {
        let services = self.services.clone();
        let mark = Arc::clone(&self.mark);
        self.register(
            "Scenario::then_events",
            Some(event_names::<D>(&expected)),
            move || async move {
                let since = *mark.lock();
                let actual = appended_since::<D>(&services, since).await?;
                ensure_eq("then_events", &expected, &actual)
            },
        )
    }

    /// Asserts that nothing was appended since the last `when_*` step.
    #[track_caller]
    pub fn then_no_events(&self) -> Self {
        let services = self.services.clone();
        let mark = Arc::clone(&self.mark);
        self.register("Scenario::then_no_events", None, move || async move {
            let since = *mark.lock();
            let actual = appended_since::<D>(&services, since).await?;
            ensure_eq("then_no_events", &Vec::new(), &actual)
        })
    }

    /// Asserts the read model stored under `(collection, id)`.
    #[track_caller]
    pub fn then_read_model<M>(&self, collection: impl Into<String>, id: impl Into<String>, expected: M) -> Self
    where
        M: DeserializeOwned + PartialEq + Debug + Send + Sync + 'static,
    {
        let (collection, id) = (collection.into(), id.into());
        let read_models = self.services.read_models.clone();
        self.register(
            "Scenario::then_read_model",
            Some(format!("{collection}/{id}")),
            move || async move {
                let actual = read_models.get::<M>(&collection, &id).await?;
                ensure_eq("then_read_model", &Some(expected), &actual)
            },
        )
    }

    /// Asserts that nothing is stored under `(collection, id)`.
    #[track_caller]
    pub fn then_no_read_model(&self, collection: impl Into<String>, id: impl Into<String>) -> Self {
        let (collection, id) = (collection.into(), id.into());
        let read_models = self.services.read_models.clone();
        self.register(
            "Scenario::then_no_read_model",
            Some(format!("{collection}/{id}")),
            move || async move {
                let actual = read_models.repository().get(&collection, &id).await?;
                ensure_eq("then_no_read_model", &None, &actual)
            },
        )
    }

    /// Asks `query` and asserts the answer.
    #[track_caller]
    pub fn then_answer(&self, query: D::Query, expected: D::Answer) -> Self {
        let query_bus = Arc::clone(&self.services.query_bus);
        self.register(
            "Scenario::then_answer",
            Some(query.name().to_string()),
            move || async move {
                let actual = query_bus.ask(&query).await?;
                ensure_eq("then_answer", &expected, &actual)
            },
        )
    }

    /// Registers a custom step. The step receives the scenario, so it can
    /// register further steps; those run before the next sibling.
    #[track_caller]
    pub fn step<F, Fut>(&self, label: impl Into<String>, action: F) -> Self
    where
        F: FnOnce(Self) -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let scenario = self.clone();
        self.register("Scenario::step", Some(label.into()), move || action(scenario))
    }

    /// Registers a custom check against the scenario's services.
    #[track_caller]
    pub fn then<F, Fut>(&self, label: impl Into<String>, check: F) -> Self
    where
        F: FnOnce(Services<D>) -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let services = self.services.clone();
        self.register("Scenario::then", Some(label.into()), move || check(services))
    }

    /// Expects the next step to fail with an error matching `matcher`.
    #[track_caller]
    pub fn expect_next_step_to_fail(&self, matcher: impl Into<ErrorMatcher>) -> Self {
        self.scheduler.expect_next_step_to_fail(matcher);
        self.clone()
    }

    /// Pauses before the next step when debugging is enabled.
    #[track_caller]
    pub fn breakpoint(&self) -> Self {
        self.scheduler.breakpoint();
        self.clone()
    }

    /// Runs every registered step. Equivalent to awaiting the scenario.
    pub async fn run(self) -> Result<Self, StepError> {
        self.scheduler.clone().run().await?;
        Ok(self)
    }
}

impl<D: Domain> Clone for Scenario<D> {
    fn clone(&self) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            services: self.services.clone(),
            mark: Arc::clone(&self.mark),
        }
    }
}

impl<D: Domain> IntoFuture for Scenario<D> {
    type Output = Result<Self, StepError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl<D: Domain> Debug for Scenario<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario")
            .field("scheduler", &self.scheduler)
            .field("mark", &*self.mark.lock())
            .finish_non_exhaustive()
    }
}

async fn append_and_publish<D: Domain>(
    services: &Services<D>,
    stream_id: &StreamId,
    events: Vec<D::Event>,
) -> StepResult {
    let envelopes: Vec<_> = events
        .into_iter()
        .map(|event| Envelope::stamp(stream_id.clone(), event, &services.clock))
        .collect();
    services
        .event_store
        .append(stream_id, ExpectedVersion::Any, envelopes.clone())
        .await?;
    services.event_bus.publish(envelopes).await?;
    Ok(())
}

async fn appended_since<D: Domain>(services: &Services<D>, position: u64) -> Result<Vec<D::Event>, StepError> {
    let stored = services.event_store.read_all_from(position).await?;
    Ok(stored.into_iter().map(|event| event.envelope.payload).collect())
}

fn ensure_eq<T: PartialEq + Debug>(step: &str, expected: &T, actual: &T) -> StepResult {
    if expected == actual {
        return Ok(());
    }
    Err(HarnessError::AssertionFailed {
        step: step.to_string(),
        expected: format!("{expected:?}"),
        actual: format!("{actual:?}"),
    }
    .into())
}

fn event_names<D: Domain>(events: &[D::Event]) -> String {
    let names: Vec<_> = events.iter().map(Message::name).collect();
    format!("[{}]", names.join(", "))
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
