//! The step scheduler.
//!
//! Steps are registered up front (and from inside other steps), then run when
//! the scheduler is awaited. Draining takes a snapshot of the queue and, after
//! each step and its checkpoint, drains whatever that step registered before
//! moving on to the next sibling. Execution order is therefore a depth-first flattening of the
//! steps and the steps they register:
//!
//! ```text
//! registered: S1, S2          S1 registers S1a, S1b while running
//! executed:   S1, S1a, S1b, S2
//! ```
//!
//! No two steps ever run at the same time: a second await of the same
//! scheduler while a run is in progress is refused.

use super::describer::{SourceLocation, StepDescriber, StepDescription};
use super::error_channel::ErrorChannel;
use super::expectation::ErrorMatcher;
use super::idle::IdleSynchronizer;
use super::queue::{Step, StepAction, StepId, TaskQueue};
use crate::config::{DebugMode, ScenarioConfig};
use crate::errors::{HarnessError, StepError, StepResult};
use crate::logging::STEP_TARGET;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::{Future, IntoFuture};
use std::panic::Location;
use std::sync::{Arc, Weak};
use tracing::{debug, info, info_span, trace, warn, Instrument};

/// Called when an armed breakpoint is reached with debugging enabled.
pub type BreakpointHook = Arc<dyn Fn(&StepDescription) -> BoxFuture<'static, ()> + Send + Sync>;

/// How the next step is executed.
#[derive(Debug, Default)]
enum TaskMode {
    /// Run the step; its error aborts the chain.
    #[default]
    Direct,
    /// Trap the step's error and check it against the matcher.
    ExpectFailure(ErrorMatcher),
}

#[derive(Default)]
struct State {
    queue: TaskQueue,
    next_id: u64,
    executing: Vec<SourceLocation>,
    mode: TaskMode,
    breakpoint_armed: bool,
    chain_pending: bool,
    running: bool,
    breakpoint_hook: Option<BreakpointHook>,
}

struct Inner {
    config: ScenarioConfig,
    describer: StepDescriber,
    synchronizer: IdleSynchronizer,
    state: Mutex<State>,
}

/// Orchestrates registered steps.
///
/// `Scheduler` is a cheap handle; clones share the same queue, which is how a
/// running step registers further steps. Every registering method returns the
/// scheduler so calls chain, and the scheduler itself is awaited to run the
/// chain:
///
/// ```rust
/// use stepwise::engine::Scheduler;
///
/// # tokio_test::block_on(async {
/// let scheduler = Scheduler::detached()
///     .step("first", || async { Ok(()) })
///     .step("second", || async { Ok(()) })
///     .await
///     .expect("both steps succeed");
///
/// assert!(!scheduler.has_pending_chain());
/// # });
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler checkpointing through `synchronizer`.
    pub fn new(config: ScenarioConfig, synchronizer: IdleSynchronizer) -> Self {
        let describer = StepDescriber::default()
            .with_source_root(config.source_root().cloned())
            .with_location_width(config.location_width());

        Self {
            inner: Arc::new(Inner {
                config,
                describer,
                synchronizer,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Creates a scheduler with default configuration and no event bus.
    pub fn detached() -> Self {
        Self::new(
            ScenarioConfig::default(),
            IdleSynchronizer::detached(ErrorChannel::new()),
        )
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &ScenarioConfig {
        &self.inner.config
    }

    /// The channel asynchronous bus errors are collected in.
    pub fn errors(&self) -> &ErrorChannel {
        self.inner.synchronizer.errors()
    }

    /// Number of steps waiting to run.
    pub fn pending_steps(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether steps were registered that have not been run yet.
    pub fn has_pending_chain(&self) -> bool {
        self.inner.state.lock().chain_pending
    }

    /// Replaces the hook breakpoints hand control to.
    pub fn set_breakpoint_hook(&self, hook: BreakpointHook) {
        self.inner.state.lock().breakpoint_hook = Some(hook);
    }

    /// Registers a step on behalf of `operation`, a qualified name such as
    /// `Scenario::given_events` that appears (owner stripped) in diagnostics.
    ///
    /// The step's location is the caller's, so wrappers should be
    /// `#[track_caller]` too.
    #[track_caller]
    pub fn register<F, Fut>(&self, operation: &'static str, label: Option<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        let origin = SourceLocation::from_location(Location::caller(), operation);
        let action: StepAction = Box::new(move || Box::pin(action()));

        let mut state = self.inner.state.lock();
        let mut frames = Vec::with_capacity(state.executing.len() + 1);
        frames.push(origin);
        frames.extend(state.executing.iter().rev().cloned());
        let description = self.inner.describer.describe(frames, label.as_deref());

        let id = StepId(state.next_id);
        state.next_id += 1;
        state.queue.append(Step::new(id, description, action));
        state.chain_pending = true;
        drop(state);

        self.clone()
    }

    /// Registers a custom step.
    #[track_caller]
    pub fn step<F, Fut>(&self, label: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.register("Scheduler::step", Some(label.into()), action)
    }

    /// Expects the step registered next to fail with an error matching
    /// `matcher`. The failure is consumed; a success or a different error
    /// fails the scenario instead.
    #[track_caller]
    pub fn expect_next_step_to_fail(&self, matcher: impl Into<ErrorMatcher>) -> Self {
        let matcher = matcher.into();
        let inner = Arc::downgrade(&self.inner);
        self.register(
            "Scheduler::expect_next_step_to_fail",
            Some(matcher.to_string()),
            move || async move {
                with_inner(&inner, |inner| {
                    inner.state.lock().mode = TaskMode::ExpectFailure(matcher);
                });
                Ok(())
            },
        )
    }

    /// Pauses before the next step when debugging is enabled.
    #[track_caller]
    pub fn breakpoint(&self) -> Self {
        let inner = Arc::downgrade(&self.inner);
        self.register("Scheduler::breakpoint", None, move || async move {
            with_inner(&inner, |inner| inner.state.lock().breakpoint_armed = true);
            Ok(())
        })
    }

    /// Runs every pending step, including the ones they register, and
    /// resolves to the scheduler itself.
    ///
    /// Running again after a completed run is a no-op. On failure the
    /// remaining steps are discarded and the original error is returned.
    /// Awaiting the scheduler while another await of it is still running
    /// fails with [`HarnessError::AlreadyRunning`].
    pub async fn run(self) -> Result<Self, StepError> {
        let Some(running) = RunGuard::acquire(&self.inner)? else {
            return Ok(self);
        };

        let outcome = match self.drain().await {
            Ok(()) => self.finish(),
            Err(error) => {
                self.abandon();
                Err(error)
            }
        };
        self.inner.state.lock().chain_pending = false;
        drop(running);
        outcome.map(|()| self)
    }

    /// Depth-first drain without recursion: `levels` holds one snapshot per
    /// nesting level, so its length is the depth of the next snapshot taken.
    async fn drain(&self) -> StepResult {
        let limit = self.inner.config.max_drain_depth();
        let mut levels: Vec<std::vec::IntoIter<Step>> = Vec::new();

        loop {
            let snapshot = self.inner.state.lock().queue.take_all();
            if !snapshot.is_empty() {
                if levels.len() > limit {
                    return Err(HarnessError::DrainDepthExceeded { limit }.into());
                }
                levels.push(snapshot.into_iter());
            }

            let next = loop {
                let Some(level) = levels.last_mut() else {
                    return Ok(());
                };
                match level.next() {
                    Some(step) => break step,
                    None => {
                        levels.pop();
                    }
                }
            };

            self.execute(next).await?;
        }
    }

    async fn execute(&self, step: Step) -> StepResult {
        let (id, description, action) = step.into_parts();
        self.announce(id, &description);
        self.pause_at_breakpoint(&description).await;

        let mode = {
            let mut state = self.inner.state.lock();
            state.executing.push(description.location().clone());
            std::mem::take(&mut state.mode)
        };

        let span = info_span!("step", id = id.0, name = %description.name());
        let outcome = async {
            match mode {
                TaskMode::Direct => self.handle_task(action).await,
                TaskMode::ExpectFailure(matcher) => {
                    let trapped = self.handle_task(action).await;
                    matcher.verify(description.name(), trapped)
                }
            }
        }
        .instrument(span)
        .await;

        self.inner.state.lock().executing.pop();
        outcome
    }

    async fn handle_task(&self, action: StepAction) -> StepResult {
        action().await?;
        self.inner.synchronizer.wait_until_settled().await
    }

    fn announce(&self, id: StepId, description: &StepDescription) {
        let depth = description.depth();
        if self.inner.config.log_steps() {
            info!(target: STEP_TARGET, step = id.0, depth, "{}", description.text());
        } else {
            trace!(target: STEP_TARGET, step = id.0, depth, "{}", description.text());
        }
    }

    async fn pause_at_breakpoint(&self, next: &StepDescription) {
        let hook = {
            let mut state = self.inner.state.lock();
            if !std::mem::take(&mut state.breakpoint_armed) {
                return;
            }
            state.breakpoint_hook.clone()
        };

        if self.inner.config.debug() == DebugMode::Off {
            debug!(step = %next.name(), "breakpoint ignored, debugging is off");
            return;
        }

        match hook {
            Some(hook) => hook(next).await,
            None => {
                warn!(step = %next.text(), "breakpoint reached");
                tokio::task::yield_now().await;
            }
        }
    }

    fn finish(&self) -> StepResult {
        let mut state = self.inner.state.lock();
        state.breakpoint_armed = false;
        match std::mem::take(&mut state.mode) {
            TaskMode::Direct => Ok(()),
            TaskMode::ExpectFailure(matcher) => Err(HarnessError::UnconsumedExpectation {
                expected: matcher.to_string(),
            }
            .into()),
        }
    }

    fn abandon(&self) {
        let mut state = self.inner.state.lock();
        let discarded = state.queue.take_all();
        state.executing.clear();
        state.mode = TaskMode::Direct;
        state.breakpoint_armed = false;
        if !discarded.is_empty() {
            debug!(discarded = discarded.len(), "discarding steps after failure");
        }
    }
}

/// Marks a run in progress; cleared on drop, also when the run is cancelled.
struct RunGuard {
    inner: Arc<Inner>,
}

impl RunGuard {
    /// `None` when there is nothing to run.
    fn acquire(inner: &Arc<Inner>) -> Result<Option<Self>, HarnessError> {
        let mut state = inner.state.lock();
        if !state.chain_pending {
            return Ok(None);
        }
        if state.running {
            return Err(HarnessError::AlreadyRunning);
        }
        state.running = true;
        Ok(Some(Self {
            inner: Arc::clone(inner),
        }))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.inner.state.lock().running = false;
    }
}

fn with_inner(inner: &Weak<Inner>, apply: impl FnOnce(&Inner)) {
    if let Some(inner) = inner.upgrade() {
        apply(&inner);
    }
}

impl IntoFuture for Scheduler {
    type Output = Result<Self, StepError>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.run())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Scheduler")
            .field("pending", &state.queue.len())
            .field("chain_pending", &state.chain_pending)
            .field("mode", &state.mode)
            .finish_non_exhaustive()
    }
}
