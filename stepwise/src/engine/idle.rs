//! Checkpoints between steps.
//!
//! After every step the scheduler waits for the event bus to go idle, then
//! releases at most one error the bus reported in the meantime. This is the
//! only place where a failure inside an asynchronous listener turns into a
//! failing step.

use super::error_channel::ErrorChannel;
use crate::errors::StepResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Something that can report when it has no asynchronous work in flight.
#[async_trait]
pub trait IdleSignal: Send + Sync {
    /// Resolves once no dispatch is in flight.
    async fn until_idle(&self);
}

/// An idle signal for schedulers without an event bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysIdle;

#[async_trait]
impl IdleSignal for AlwaysIdle {
    async fn until_idle(&self) {}
}

/// Waits for the bus to settle and surfaces the oldest reported error.
#[derive(Clone)]
pub struct IdleSynchronizer {
    signal: Arc<dyn IdleSignal>,
    errors: ErrorChannel,
}

impl IdleSynchronizer {
    /// Creates a synchronizer over `signal`, draining `errors`.
    pub fn new(signal: Arc<dyn IdleSignal>, errors: ErrorChannel) -> Self {
        Self { signal, errors }
    }

    /// A synchronizer with nothing to wait for.
    pub fn detached(errors: ErrorChannel) -> Self {
        Self::new(Arc::new(AlwaysIdle), errors)
    }

    /// The channel this synchronizer drains.
    pub const fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    /// Suspends until the bus is idle, then fails with the oldest pending
    /// error if there is one.
    pub async fn wait_until_settled(&self) -> StepResult {
        self.signal.until_idle().await;
        match self.errors.take_oldest() {
            Some(error) => {
                debug!(remaining = self.errors.len(), %error, "surfacing asynchronous error");
                Err(error)
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for IdleSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleSynchronizer")
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSignal {
        waits: AtomicUsize,
    }

    #[async_trait]
    impl IdleSignal for CountingSignal {
        async fn until_idle(&self) {
            self.waits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn each_checkpoint_surfaces_one_error_in_report_order() {
        // Given: two errors reported before any checkpoint
        let errors = ErrorChannel::new();
        errors.report("first".into());
        errors.report("second".into());
        let synchronizer = IdleSynchronizer::detached(errors);

        // Then: checkpoints release them one at a time, then succeed
        let first = synchronizer.wait_until_settled().await.unwrap_err();
        let second = synchronizer.wait_until_settled().await.unwrap_err();
        let third = synchronizer.wait_until_settled().await;

        assert_eq!(first.to_string(), "first");
        assert_eq!(second.to_string(), "second");
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn waits_for_the_bus_before_checking_errors() {
        let signal = Arc::new(CountingSignal {
            waits: AtomicUsize::new(0),
        });
        let synchronizer = IdleSynchronizer::new(signal.clone(), ErrorChannel::new());

        synchronizer.wait_until_settled().await.unwrap();
        synchronizer.wait_until_settled().await.unwrap();

        assert_eq!(signal.waits.load(Ordering::SeqCst), 2);
    }
}
