//! The deferred step engine.
//!
//! - [`describer`]: labels steps from their registration site
//! - [`queue`]: pending steps and the FIFO holding them
//! - [`error_channel`]: errors reported asynchronously by the event bus
//! - [`idle`]: checkpoints that wait for the bus and surface those errors
//! - [`expectation`]: matchers for steps that are expected to fail
//! - [`scheduler`]: registration, depth-first draining and the awaitable handle

pub mod describer;
pub mod error_channel;
pub mod expectation;
pub mod idle;
pub mod queue;
pub mod scheduler;

pub use describer::{SourceLocation, StepDescriber, StepDescription};
pub use error_channel::{ErrorCallback, ErrorChannel};
pub use expectation::ErrorMatcher;
pub use idle::{AlwaysIdle, IdleSignal, IdleSynchronizer};
pub use queue::{Step, StepAction, StepFuture, StepId, TaskQueue};
pub use scheduler::{BreakpointHook, Scheduler};
