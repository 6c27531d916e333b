// tests/state_manager.rs

use habitat::dag::{AsyncTask, StateManager, TaskGraph, TaskId, TaskState};

/// diamond: a -> (b, c) -> d
fn diamond() -> (Vec<Vec<TaskId>>, [TaskId; 4]) {
    let mut graph: TaskGraph<()> = TaskGraph::new();
    let mut add = |label: &str| graph.add_task(AsyncTask::new(label, |_deps| async { Ok(()) }));
    let a = add("a");
    let b = add("b");
    let c = add("c");
    let d = add("d");
    graph.add_dependency(b, a).unwrap();
    graph.add_dependency(c, a).unwrap();
    graph.add_dependency(d, b).unwrap();
    graph.add_dependency(d, c).unwrap();

    let deps = graph.ids().map(|id| graph.dependencies_of(id)).collect();
    (deps, [a, b, c, d])
}

#[test]
fn only_roots_are_ready_at_start() {
    let (deps, [a, ..]) = diamond();
    let mut sm = StateManager::new(&deps, &[true; 4]);

    assert_eq!(sm.take_ready(), vec![a]);
    // Handed out once only.
    assert!(sm.take_ready().is_empty());
    assert_eq!(sm.remaining(), 4);
}

#[test]
fn join_waits_for_every_dependency() {
    let (deps, [a, b, c, d]) = diamond();
    let mut sm = StateManager::new(&deps, &[true; 4]);
    sm.take_ready();

    sm.mark_executing(a);
    assert_eq!(sm.state_of(a), Some(TaskState::Executing));

    let mut ready = sm.mark_finished(a);
    ready.sort();
    assert_eq!(ready, vec![b, c]);

    assert!(sm.mark_finished(b).is_empty());
    assert_eq!(sm.mark_finished(c), vec![d]);

    assert!(!sm.all_finished());
    sm.mark_finished(d);
    assert!(sm.all_finished());
}

#[test]
fn duplicate_finish_is_ignored() {
    let (deps, [a, ..]) = diamond();
    let mut sm = StateManager::new(&deps, &[true; 4]);
    sm.take_ready();

    sm.mark_finished(a);
    assert!(sm.mark_finished(a).is_empty());
    assert_eq!(sm.remaining(), 3);
}

#[test]
fn excluded_tasks_are_never_ready() {
    let (deps, [a, b, c, d]) = diamond();
    // Only a and b take part.
    let mut sm = StateManager::new(&deps, &[true, true, false, false]);

    assert_eq!(sm.take_ready(), vec![a]);
    assert_eq!(sm.mark_finished(a), vec![b]);
    sm.mark_finished(b);

    assert!(sm.all_finished());
    assert_eq!(sm.state_of(c), Some(TaskState::Ready));
    assert_eq!(sm.state_of(d), Some(TaskState::Ready));
}
