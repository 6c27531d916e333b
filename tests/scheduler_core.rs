// tests/scheduler_core.rs

mod common;
use crate::common::builders::{head_update, plan, plan_builder};
use crate::common::init_tracing;

use habitat::engine::{
    transition, BatchSummary, CoreCommand, Effect, Phase, PlanStore, RuntimeOptions,
    SchedulerCore, SchedulerEvent,
};
use habitat::plan::{Commit, Head};
use habitat::types::SchedulerState;

fn core_with(names: &[&str], options: RuntimeOptions) -> SchedulerCore {
    let mut store = PlanStore::new();
    for name in names {
        store.insert(plan(name)).unwrap();
    }
    SchedulerCore::new(store, options)
}

fn completed() -> SchedulerEvent {
    SchedulerEvent::BatchCompleted {
        summary: BatchSummary::default(),
    }
}

#[test]
fn transition_table() {
    let stale = SchedulerEvent::StalenessChecked {
        stale: vec![plan("api")],
    };
    let none_stale = SchedulerEvent::StalenessChecked { stale: vec![] };

    assert_eq!(
        transition(Phase::Idle, &SchedulerEvent::Tick),
        (Phase::Checking, Some(Effect::CheckStaleness))
    );
    assert_eq!(transition(Phase::Checking, &SchedulerEvent::Tick), (Phase::Checking, None));
    assert_eq!(transition(Phase::Updating, &SchedulerEvent::Tick), (Phase::Updating, None));

    assert_eq!(transition(Phase::Checking, &none_stale), (Phase::Idle, None));
    assert_eq!(
        transition(Phase::Checking, &stale),
        (Phase::Updating, Some(Effect::SubmitBatch))
    );
    assert_eq!(transition(Phase::Idle, &stale), (Phase::Idle, None));

    assert_eq!(transition(Phase::Updating, &completed()), (Phase::Idle, None));
    assert_eq!(transition(Phase::Idle, &completed()), (Phase::Idle, None));

    assert_eq!(
        transition(Phase::Updating, &SchedulerEvent::ShutdownRequested),
        (Phase::Idle, Some(Effect::CancelBatch))
    );
    assert_eq!(
        transition(Phase::Idle, &SchedulerEvent::ShutdownRequested),
        (Phase::Idle, Some(Effect::Exit))
    );
}

#[test]
fn checking_is_reported_as_idle() {
    assert_eq!(Phase::Idle.public_state(), SchedulerState::Idle);
    assert_eq!(Phase::Checking.public_state(), SchedulerState::Idle);
    assert_eq!(Phase::Updating.public_state(), SchedulerState::Updating);
}

#[test]
fn tick_snapshots_every_plan() {
    init_tracing();
    let mut core = core_with(&["api", "web"], RuntimeOptions::default());

    let step = core.step(SchedulerEvent::Tick);

    assert!(step.keep_running);
    match step.commands.as_slice() {
        [CoreCommand::CheckStaleness(snapshot)] => {
            let names: Vec<&str> = snapshot.iter().map(|p| p.name.as_str()).collect();
            assert_eq!(names, vec!["api", "web"]);
        }
        other => panic!("expected CheckStaleness, got {other:?}"),
    }
    assert_eq!(core.phase(), Phase::Checking);
}

#[test]
fn stale_plans_start_a_batch_and_ticks_are_ignored_until_it_completes() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());

    core.step(SchedulerEvent::Tick);
    let step = core.step(SchedulerEvent::StalenessChecked {
        stale: vec![plan("api")],
    });
    assert!(matches!(step.commands.as_slice(), [CoreCommand::SubmitBatch(p)] if p.len() == 1));
    assert_eq!(core.state(), SchedulerState::Updating);

    for _ in 0..3 {
        let step = core.step(SchedulerEvent::Tick);
        assert!(step.commands.is_empty());
        assert_eq!(core.state(), SchedulerState::Updating);
    }

    core.step(completed());
    assert_eq!(core.state(), SchedulerState::Idle);
    assert_eq!(core.status().completed_batches, 1);
    assert_eq!(core.status().evaluated_ticks, 1);
    assert!(core.last_batch().is_some());
}

#[test]
fn exactly_one_idle_transition_per_batch() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());

    core.step(SchedulerEvent::Tick);
    core.step(SchedulerEvent::StalenessChecked {
        stale: vec![plan("api")],
    });
    core.step(completed());
    // A duplicate completion signal does not count as another batch.
    core.step(completed());

    assert_eq!(core.status().completed_batches, 1);
    assert_eq!(core.phase(), Phase::Idle);
}

#[test]
fn nothing_stale_returns_to_idle_without_a_batch() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());

    core.step(SchedulerEvent::Tick);
    let step = core.step(SchedulerEvent::StalenessChecked { stale: vec![] });

    assert!(step.commands.is_empty());
    assert!(step.keep_running);
    assert_eq!(core.phase(), Phase::Idle);
    assert_eq!(core.status().completed_batches, 0);
    assert_eq!(core.status().evaluated_ticks, 1);
}

#[test]
fn head_updates_apply_to_existing_plans_only() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());

    core.step(SchedulerEvent::HeadAdvanced(head_update(&plan("api"), "abc")));
    core.step(SchedulerEvent::HeadAdvanced(head_update(&plan("gone"), "def")));

    let (_, api) = core.store().find("api").unwrap();
    assert_eq!(api.head, Head::Commit(Commit::new("abc")));
    assert_eq!(core.store().len(), 1);
}

#[test]
fn head_update_from_before_a_repository_change_is_dropped() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());
    let before = plan("api");

    core.step(SchedulerEvent::Tick);
    core.step(SchedulerEvent::StalenessChecked {
        stale: vec![before.clone()],
    });
    // Re-pointed while its pipeline is still running.
    let moved = plan_builder("api")
        .repository("https://mirror.example.com/api.git")
        .build()
        .unwrap();
    core.store_mut().replace(0, moved).unwrap();

    core.step(SchedulerEvent::HeadAdvanced(head_update(&before, "abc")));

    let (_, api) = core.store().find("api").unwrap();
    assert_eq!(api.head, Head::NotYetCheckedOut);
    assert_eq!(api.repository.url, "https://mirror.example.com/api.git");
}

#[test]
fn shutdown_while_updating_cancels_the_batch() {
    init_tracing();
    let mut core = core_with(&["api"], RuntimeOptions::default());
    core.step(SchedulerEvent::Tick);
    core.step(SchedulerEvent::StalenessChecked {
        stale: vec![plan("api")],
    });

    let step = core.step(SchedulerEvent::ShutdownRequested);

    assert!(!step.keep_running);
    assert!(matches!(
        step.commands.as_slice(),
        [CoreCommand::CancelBatch, CoreCommand::RequestExit]
    ));
}

#[test]
fn exit_when_idle_stops_after_first_evaluation() {
    init_tracing();
    let options = RuntimeOptions {
        exit_when_idle: true,
    };

    let mut quiet = core_with(&["api"], options);
    quiet.step(SchedulerEvent::Tick);
    let step = quiet.step(SchedulerEvent::StalenessChecked { stale: vec![] });
    assert!(!step.keep_running);

    let mut busy = core_with(&["api"], options);
    busy.step(SchedulerEvent::Tick);
    let step = busy.step(SchedulerEvent::StalenessChecked {
        stale: vec![plan("api")],
    });
    assert!(step.keep_running);
    let step = busy.step(completed());
    assert!(!step.keep_running);
    assert!(matches!(step.commands.as_slice(), [CoreCommand::RequestExit]));
}
