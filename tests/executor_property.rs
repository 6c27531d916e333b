// tests/executor_property.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use proptest::prelude::*;

use habitat::dag::{AsyncTask, Dependencies, TaskGraph, TaskState};
use habitat::errors::HabitatError;
use habitat::exec::Executor;

/// Dependency lists where task `i` may only depend on tasks `0..i`, so the
/// graph is acyclic by construction.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, picks)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        picks.into_iter().map(|p| p % i).collect()
                    }
                })
                .collect()
        })
    })
}

#[derive(Debug, Default)]
struct Timeline {
    clock: AtomicUsize,
    /// task index -> (start tick, finish tick)
    spans: Mutex<HashMap<usize, (usize, usize)>>,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_task_starts_after_its_dependencies_finish(
        deps in dag_strategy(12),
        failing in proptest::collection::vec(any::<bool>(), 12),
        workers in 1usize..4,
    ) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let timeline = Arc::new(Timeline::default());
        let mut graph: TaskGraph<usize> = TaskGraph::new();
        let mut ids = Vec::new();

        for i in 0..deps.len() {
            let timeline = Arc::clone(&timeline);
            let fail = failing[i];
            ids.push(graph.add_task(AsyncTask::new(
                format!("t{i}"),
                move |_deps: Dependencies<usize>| async move {
                    let start = timeline.clock.fetch_add(1, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    let finish = timeline.clock.fetch_add(1, Ordering::SeqCst);
                    timeline.spans.lock().unwrap().insert(i, (start, finish));
                    if fail {
                        Err(HabitatError::ScriptFailure(format!("t{i}")))
                    } else {
                        Ok(i)
                    }
                },
            )));
        }
        for (i, ds) in deps.iter().enumerate() {
            for &d in ds {
                graph.add_dependency(ids[i], ids[d]).unwrap();
            }
        }

        let report = rt
            .block_on(async { Executor::new(workers).submit(graph)?.wait().await })
            .unwrap();

        let spans = timeline.spans.lock().unwrap();
        // No short-circuit: every task ran, whatever its dependencies did.
        prop_assert_eq!(spans.len(), deps.len());

        for (i, ds) in deps.iter().enumerate() {
            prop_assert_eq!(report.state(ids[i]), Some(TaskState::Finished));
            for &d in ds {
                let (_, dep_finish) = spans[&d];
                let (start, _) = spans[&i];
                prop_assert!(dep_finish < start, "t{} started before t{} finished", i, d);
            }
        }
    }
}
