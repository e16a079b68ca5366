//! Errors reported asynchronously by the event bus.

use crate::errors::StepError;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Callback a bus invokes when a listener fails outside of any step.
pub type ErrorCallback = Arc<dyn Fn(StepError) + Send + Sync>;

/// FIFO of errors waiting for the next checkpoint.
///
/// The event bus is the producer (through [`ErrorChannel::reporter`]); the
/// idle synchronizer is the only consumer and releases one error per
/// checkpoint, oldest first.
#[derive(Clone, Default)]
pub struct ErrorChannel {
    pending: Arc<Mutex<VecDeque<StepError>>>,
}

impl ErrorChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error behind the ones already reported.
    pub fn report(&self, error: StepError) {
        self.pending.lock().push_back(error);
    }

    /// Removes and returns the oldest pending error.
    pub fn take_oldest(&self) -> Option<StepError> {
        self.pending.lock().pop_front()
    }

    /// Number of errors waiting for a checkpoint.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no errors are waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// A callback feeding this channel, handed to the event bus at
    /// construction.
    pub fn reporter(&self) -> ErrorCallback {
        let channel = self.clone();
        Arc::new(move |error| channel.report(error))
    }
}

impl std::fmt::Debug for ErrorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorChannel")
            .field("pending", &self.len())
            .finish()
    }
}
