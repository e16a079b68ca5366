//! In-memory event bus.
//!
//! Every subscriber gets its own worker task fed by an unbounded channel, so
//! a listener sees events in publication order while different listeners
//! run independently of each other and of the publisher. The number of
//! deliveries not yet handled is kept in a `watch` channel; the bus is idle
//! when it reaches zero.
//!
//! A failing (or panicking) listener never stops its worker. The failure is
//! logged and handed to the error callback the bus was built with, before
//! the delivery counts as handled, so a checkpoint waiting for idleness
//! always sees it.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use stepwise::bus::{EventBus, EventListener};
use stepwise::engine::{ErrorCallback, IdleSignal};
use stepwise::errors::{BusError, StepError};
use stepwise::types::Envelope;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Raised when a listener panics while handling an event.
#[derive(Debug, thiserror::Error)]
#[error("listener '{listener}' panicked")]
pub struct ListenerPanicked {
    /// The listener's name
    pub listener: String,
}

struct Subscriber<E> {
    name: String,
    sender: mpsc::UnboundedSender<Envelope<E>>,
}

/// Publishes events to listeners running on background tasks.
///
/// Subscribing spawns a task, so it must happen inside a Tokio runtime.
pub struct InMemoryEventBus<E> {
    subscribers: RwLock<Vec<Subscriber<E>>>,
    in_flight: Arc<watch::Sender<usize>>,
    on_error: ErrorCallback,
}

impl<E> InMemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Creates a bus reporting listener failures to `on_error`.
    pub fn new(on_error: ErrorCallback) -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            subscribers: RwLock::new(Vec::new()),
            in_flight: Arc::new(in_flight),
            on_error,
        }
    }

    /// Deliveries not yet handled.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.borrow()
    }

    /// Number of subscribed listeners.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

async fn run_listener<E>(
    listener: Arc<dyn EventListener<E>>,
    mut deliveries: mpsc::UnboundedReceiver<Envelope<E>>,
    in_flight: Arc<watch::Sender<usize>>,
    on_error: ErrorCallback,
) where
    E: Send + Sync + 'static,
{
    while let Some(envelope) = deliveries.recv().await {
        let outcome = AssertUnwindSafe(listener.on_event(&envelope))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(Box::new(ListenerPanicked {
                    listener: listener.name().to_string(),
                }) as StepError)
            });

        if let Err(error) = outcome {
            warn!(listener = listener.name(), stream = %envelope.stream_id, %error, "listener failed");
            on_error(error);
        }
        in_flight.send_modify(|count| *count = count.saturating_sub(1));
    }
    debug!(listener = listener.name(), "listener stopped");
}

#[async_trait]
impl<E> IdleSignal for InMemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn until_idle(&self) {
        let mut in_flight = self.in_flight.subscribe();
        // the sender lives as long as the bus, so waiting cannot fail
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryEventBus<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn publish(&self, events: Vec<Envelope<E>>) -> Result<(), BusError> {
        let subscribers = self.subscribers.read();
        for envelope in events {
            for subscriber in subscribers.iter() {
                self.in_flight.send_modify(|count| *count += 1);
                if subscriber.sender.send(envelope.clone()).is_err() {
                    self.in_flight.send_modify(|count| *count = count.saturating_sub(1));
                    warn!(listener = %subscriber.name, "listener worker is gone");
                    return Err(BusError::Closed);
                }
            }
        }
        Ok(())
    }

    fn subscribe(&self, listener: Arc<dyn EventListener<E>>) {
        let (sender, deliveries) = mpsc::unbounded_channel();
        let name = listener.name().to_string();
        tokio::spawn(run_listener(
            listener,
            deliveries,
            Arc::clone(&self.in_flight),
            Arc::clone(&self.on_error),
        ));
        debug!(listener = %name, "listener subscribed");
        self.subscribers.write().push(Subscriber { name, sender });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use stepwise::engine::ErrorChannel;
    use stepwise::errors::StepResult;
    use stepwise::types::{Clock, StreamId};

    struct Recorder {
        seen: Arc<Mutex<Vec<u32>>>,
        fail_on: Option<u32>,
    }

    #[async_trait]
    impl EventListener<u32> for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_event(&self, event: &Envelope<u32>) -> StepResult {
            tokio::task::yield_now().await;
            if Some(event.payload) == self.fail_on {
                return Err(format!("cannot handle {}", event.payload).into());
            }
            self.seen.lock().push(event.payload);
            Ok(())
        }
    }

    struct Panicker;

    #[async_trait]
    impl EventListener<u32> for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        async fn on_event(&self, _event: &Envelope<u32>) -> StepResult {
            panic!("listener bug");
        }
    }

    fn envelopes(payloads: &[u32]) -> Vec<Envelope<u32>> {
        let clock = Clock::default();
        let stream_id = StreamId::try_new("numbers").unwrap();
        payloads
            .iter()
            .map(|payload| Envelope::stamp(stream_id.clone(), *payload, &clock))
            .collect()
    }

    #[tokio::test]
    async fn listeners_receive_events_in_order_before_idle() {
        // Given: a bus with a slow listener
        let errors = ErrorChannel::new();
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new(errors.reporter());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(Recorder {
            seen: seen.clone(),
            fail_on: None,
        }));

        // When: events are published and the bus is awaited
        bus.publish(envelopes(&[1, 2, 3])).await.unwrap();
        bus.until_idle().await;

        // Then: every event was handled, in order
        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        assert_eq!(bus.in_flight(), 0);
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn listener_errors_reach_the_callback_and_do_not_stop_the_worker() {
        let errors = ErrorChannel::new();
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new(errors.reporter());
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(Arc::new(Recorder {
            seen: seen.clone(),
            fail_on: Some(2),
        }));

        bus.publish(envelopes(&[1, 2, 3])).await.unwrap();
        bus.until_idle().await;

        assert_eq!(*seen.lock(), vec![1, 3]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.take_oldest().unwrap().to_string(), "cannot handle 2");
    }

    #[tokio::test]
    async fn panicking_listener_is_reported_not_fatal() {
        let errors = ErrorChannel::new();
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new(errors.reporter());
        bus.subscribe(Arc::new(Panicker));

        bus.publish(envelopes(&[1])).await.unwrap();
        bus.until_idle().await;

        let error = errors.take_oldest().unwrap();
        assert_eq!(
            error.downcast_ref::<ListenerPanicked>().unwrap().listener,
            "panicker"
        );
        assert_eq!(error.to_string(), "listener 'panicker' panicked");
    }

    #[tokio::test]
    async fn idle_bus_without_subscribers_resolves_immediately() {
        let bus: InMemoryEventBus<u32> = InMemoryEventBus::new(ErrorChannel::new().reporter());

        bus.publish(envelopes(&[1, 2])).await.unwrap();
        bus.until_idle().await;

        assert_eq!(bus.subscriber_count(), 0);
    }
}
