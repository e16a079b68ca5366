//! Checkpoints surface asynchronous failures between steps.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stepwise::engine::{ErrorCallback, ErrorChannel, IdleSignal, IdleSynchronizer};
use stepwise::{ErrorMatcher, HarnessError, Scheduler, ScenarioConfig};
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
#[error("projection failed: {0}")]
struct ProjectionFailed(&'static str);

/// A stand-in event bus whose listeners run on spawned tasks.
#[derive(Default)]
struct BackgroundBus {
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundBus {
    fn publish_failing(&self, reporter: ErrorCallback, reason: &'static str) {
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            reporter(Box::new(ProjectionFailed(reason)));
        });
        self.in_flight.lock().push(handle);
    }
}

#[async_trait]
impl IdleSignal for BackgroundBus {
    async fn until_idle(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.in_flight.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

fn scheduler_over(bus: Arc<BackgroundBus>) -> Scheduler {
    let errors = ErrorChannel::new();
    Scheduler::new(ScenarioConfig::default(), IdleSynchronizer::new(bus, errors))
}

#[tokio::test]
async fn listener_failure_fails_the_scenario_with_the_listeners_error() {
    // Given: a step that publishes to a listener that will fail later
    let bus = Arc::new(BackgroundBus::default());
    let scheduler = scheduler_over(bus.clone());
    let reporter = scheduler.errors().reporter();
    let next_ran = Arc::new(AtomicBool::new(false));
    let flag = next_ran.clone();

    // When: the publishing step itself succeeds
    let error = scheduler
        .step("publish", move || async move {
            bus.publish_failing(reporter, "balance");
            Ok(())
        })
        .step("next", move || async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

    // Then: the listener's own error surfaces and the chain stops
    let failure = error.downcast_ref::<ProjectionFailed>().unwrap();
    assert_eq!(failure.0, "balance");
    assert!(!next_ran.load(Ordering::SeqCst));
}

#[tokio::test]
async fn listener_failure_can_be_expected() {
    let bus = Arc::new(BackgroundBus::default());
    let scheduler = scheduler_over(bus.clone());
    let reporter = scheduler.errors().reporter();

    scheduler
        .expect_next_step_to_fail(ErrorMatcher::kind::<ProjectionFailed>())
        .step("publish", move || async move {
            bus.publish_failing(reporter, "balance");
            Ok(())
        })
        .step("afterwards", || async { Ok(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn queued_errors_surface_one_per_checkpoint() {
    // Given: two errors reported before any checkpoint
    let scheduler = scheduler_over(Arc::new(BackgroundBus::default()));
    let reporter = scheduler.errors().reporter();
    reporter(Box::new(ProjectionFailed("first")));
    reporter(Box::new(ProjectionFailed("second")));

    // When / Then: each checkpoint releases exactly one of them, oldest first
    let first = scheduler
        .step("one", || async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(first.to_string(), "projection failed: first");

    let second = scheduler
        .step("two", || async { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(second.to_string(), "projection failed: second");

    scheduler.step("three", || async { Ok(()) }).await.unwrap();
}

#[tokio::test]
async fn mismatched_expected_failure_reports_both_errors() {
    let error = Scheduler::detached()
        .expect_next_step_to_fail("boom")
        .step("fails differently", || async { Err("other".into()) })
        .await
        .unwrap_err();

    match error.downcast_ref::<HarnessError>() {
        Some(HarnessError::UnexpectedFailure { expected, actual, .. }) => {
            assert_eq!(expected, "\"boom\"");
            assert_eq!(actual, "other");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn expected_failure_that_does_not_happen_fails() {
    let error = Scheduler::detached()
        .expect_next_step_to_fail("boom")
        .step("succeeds", || async { Ok(()) })
        .await
        .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<HarnessError>(),
        Some(HarnessError::MissingFailure { .. })
    ));
}
