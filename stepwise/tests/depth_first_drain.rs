//! Property tests for the order in which nested steps run.

use parking_lot::Mutex;
use proptest::prelude::*;
use std::future::IntoFuture;
use std::sync::Arc;
use stepwise::engine::Scheduler;

type Log = Arc<Mutex<Vec<String>>>;

/// A step and the steps it registers while running.
#[derive(Debug, Clone)]
struct Node {
    children: Vec<Node>,
}

fn forest() -> impl Strategy<Value = Vec<Node>> {
    let leaf = Just(Node { children: vec![] });
    let node = leaf.prop_recursive(4, 48, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(|children| Node { children })
    });
    prop::collection::vec(node, 0..5)
}

fn register(scheduler: &Scheduler, node: Node, path: String, log: Log) {
    let nested = scheduler.clone();
    scheduler.step(path.clone(), move || async move {
        log.lock().push(path.clone());
        for (index, child) in node.children.into_iter().enumerate() {
            register(&nested, child, format!("{path}.{index}"), log.clone());
        }
        Ok(())
    });
}

fn preorder(nodes: &[Node], prefix: Option<&str>, out: &mut Vec<String>) {
    for (index, node) in nodes.iter().enumerate() {
        let path = prefix.map_or_else(|| index.to_string(), |prefix| format!("{prefix}.{index}"));
        out.push(path.clone());
        preorder(&node.children, Some(&path), out);
    }
}

proptest! {
    #[test]
    fn nested_steps_run_before_later_siblings(roots in forest()) {
        // Given: a forest of steps where each step registers its children
        let log = Log::default();
        let scheduler = Scheduler::detached();
        for (index, root) in roots.iter().cloned().enumerate() {
            register(&scheduler, root, index.to_string(), log.clone());
        }

        // When: the scheduler is awaited
        tokio_test::block_on(scheduler.clone().into_future()).unwrap();

        // Then: execution order is the depth-first flattening of the forest
        let mut expected = Vec::new();
        preorder(&roots, None, &mut expected);
        prop_assert_eq!(&*log.lock(), &expected);
    }

    #[test]
    fn awaiting_again_runs_nothing(roots in forest()) {
        let log = Log::default();
        let scheduler = Scheduler::detached();
        for (index, root) in roots.into_iter().enumerate() {
            register(&scheduler, root, index.to_string(), log.clone());
        }
        tokio_test::block_on(scheduler.clone().into_future()).unwrap();
        let first_run = log.lock().len();

        tokio_test::block_on(scheduler.clone().into_future()).unwrap();

        prop_assert_eq!(log.lock().len(), first_run);
        prop_assert_eq!(scheduler.pending_steps(), 0);
    }
}
