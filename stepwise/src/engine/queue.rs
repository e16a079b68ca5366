//! Pending steps and the queue that holds them.

use super::describer::StepDescription;
use crate::errors::StepResult;
use futures::future::BoxFuture;

/// Future returned by a step action.
pub type StepFuture = BoxFuture<'static, StepResult>;

/// A deferred step body. Runs at most once.
pub type StepAction = Box<dyn FnOnce() -> StepFuture + Send>;

/// Monotonic identifier of a step within one scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepId(pub u64);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One registered unit of setup, action or assertion.
///
/// A step owns its action, so it can only ever sit in one queue once and is
/// consumed when executed.
pub struct Step {
    id: StepId,
    description: StepDescription,
    action: StepAction,
}

impl Step {
    /// Creates a step; the description is fixed from here on.
    pub fn new(id: StepId, description: StepDescription, action: StepAction) -> Self {
        Self {
            id,
            description,
            action,
        }
    }

    /// The step's identifier.
    pub const fn id(&self) -> StepId {
        self.id
    }

    /// The description computed at registration.
    pub const fn description(&self) -> &StepDescription {
        &self.description
    }

    pub(crate) fn into_parts(self) -> (StepId, StepDescription, StepAction) {
        (self.id, self.description, self.action)
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("description", &self.description.text())
            .finish_non_exhaustive()
    }
}

/// FIFO of pending steps.
///
/// Draining always works on a snapshot taken with [`TaskQueue::take_all`];
/// steps appended while that snapshot is being executed land in the next one.
#[derive(Debug, Default)]
pub struct TaskQueue {
    steps: Vec<Step>,
}

impl TaskQueue {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Appends a step at the back.
    pub fn append(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Removes and returns every pending step, leaving the queue empty.
    pub fn take_all(&mut self) -> Vec<Step> {
        std::mem::take(&mut self.steps)
    }

    /// Iterates over pending steps without removing them.
    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    /// Number of pending steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether no steps are pending.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::describer::StepDescriber;

    fn step(id: u64) -> Step {
        let description = StepDescriber::default().describe(Vec::new(), Some("noop"));
        Step::new(StepId(id), description, Box::new(|| Box::pin(async { Ok(()) })))
    }

    #[test]
    fn take_all_returns_steps_in_insertion_order() {
        let mut queue = TaskQueue::new();
        queue.append(step(1));
        queue.append(step(2));
        queue.append(step(3));

        let ids: Vec<_> = queue.take_all().iter().map(Step::id).collect();

        assert_eq!(ids, vec![StepId(1), StepId(2), StepId(3)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn appends_after_a_snapshot_land_in_the_next_snapshot() {
        let mut queue = TaskQueue::new();
        queue.append(step(1));

        let first = queue.take_all();
        queue.append(step(2));
        let second = queue.take_all();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id(), StepId(2));
    }
}
