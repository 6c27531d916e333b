// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`transition`] maps `(phase, event)` to the next phase and at most one
//! effect. [`SchedulerCore`] wraps it with the plan store and counters and
//! turns effects into [`CoreCommand`]s carrying the data the IO shell
//! needs.
//!
//! Nothing here touches Tokio, channels, the clock, or capabilities, so
//! the whole state machine is tested by feeding it events.

use tracing::{debug, info, warn};

use crate::engine::store::{HeadAdvance, PlanStore};
use crate::engine::summary::BatchSummary;
use crate::engine::RuntimeOptions;
use crate::plan::{HeadUpdate, Plan};
use crate::types::{SchedulerState, SchedulerStatus};

/// Internal scheduler phase.
///
/// `Checking` covers the window between a tick and the staleness results;
/// nothing has been submitted yet, so it is reported as `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Checking,
    Updating,
}

impl Phase {
    pub fn public_state(self) -> SchedulerState {
        match self {
            Phase::Idle | Phase::Checking => SchedulerState::Idle,
            Phase::Updating => SchedulerState::Updating,
        }
    }
}

/// Events consumed by the core.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Timer tick or manual trigger.
    Tick,
    /// Staleness results for the last tick's snapshot: the plans to update.
    StalenessChecked { stale: Vec<Plan> },
    /// Every task of the in-flight batch is `Finished`.
    BatchCompleted { summary: BatchSummary },
    /// A pipeline checked out a new commit.
    HeadAdvanced(HeadUpdate),
    ShutdownRequested,
}

/// Phase-level effect chosen by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    CheckStaleness,
    SubmitBatch,
    CancelBatch,
    Exit,
}

/// Command for the IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Evaluate staleness of these plans off the scheduler task.
    CheckStaleness(Vec<Plan>),
    /// Build one pipeline per plan and submit them as a single batch.
    SubmitBatch(Vec<Plan>),
    /// Cancel the in-flight batch.
    CancelBatch,
    /// Stop the scheduler loop.
    RequestExit,
}

/// Result of feeding one event to the core.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    fn continue_with(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// The scheduler's transition function.
///
/// `HeadAdvanced` never changes the phase; it is handled by the store.
pub fn transition(phase: Phase, event: &SchedulerEvent) -> (Phase, Option<Effect>) {
    match (phase, event) {
        (Phase::Idle, SchedulerEvent::Tick) => (Phase::Checking, Some(Effect::CheckStaleness)),
        (busy, SchedulerEvent::Tick) => (busy, None),

        (Phase::Checking, SchedulerEvent::StalenessChecked { stale }) if stale.is_empty() => {
            (Phase::Idle, None)
        }
        (Phase::Checking, SchedulerEvent::StalenessChecked { .. }) => {
            (Phase::Updating, Some(Effect::SubmitBatch))
        }
        (other, SchedulerEvent::StalenessChecked { .. }) => (other, None),

        (Phase::Updating, SchedulerEvent::BatchCompleted { .. }) => (Phase::Idle, None),
        (other, SchedulerEvent::BatchCompleted { .. }) => (other, None),

        (other, SchedulerEvent::HeadAdvanced(_)) => (other, None),

        (Phase::Updating, SchedulerEvent::ShutdownRequested) => {
            (Phase::Idle, Some(Effect::CancelBatch))
        }
        (_, SchedulerEvent::ShutdownRequested) => (Phase::Idle, Some(Effect::Exit)),
    }
}

/// Scheduler state owned by the scheduler task.
#[derive(Debug)]
pub struct SchedulerCore {
    phase: Phase,
    store: PlanStore,
    options: RuntimeOptions,
    last_batch: Option<BatchSummary>,
    completed_batches: u64,
    evaluated_ticks: u64,
}

impl SchedulerCore {
    pub fn new(store: PlanStore, options: RuntimeOptions) -> Self {
        Self {
            phase: Phase::Idle,
            store,
            options,
            last_batch: None,
            completed_batches: 0,
            evaluated_ticks: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> SchedulerState {
        self.phase.public_state()
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            completed_batches: self.completed_batches,
            evaluated_ticks: self.evaluated_ticks,
        }
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PlanStore {
        &mut self.store
    }

    pub fn last_batch(&self) -> Option<&BatchSummary> {
        self.last_batch.as_ref()
    }

    /// Handle a single event and return what the shell should do next.
    pub fn step(&mut self, event: SchedulerEvent) -> CoreStep {
        let (next, effect) = transition(self.phase, &event);
        let previous = self.phase;
        self.phase = next;

        if previous != next {
            debug!(from = ?previous, to = ?next, "scheduler phase changed");
        }

        match event {
            SchedulerEvent::Tick => match effect {
                Some(Effect::CheckStaleness) => {
                    let snapshot = self.store.snapshot();
                    debug!(plans = snapshot.len(), "evaluating plans");
                    CoreStep::continue_with(vec![CoreCommand::CheckStaleness(snapshot)])
                }
                _ => {
                    debug!(phase = ?previous, "tick ignored while busy");
                    CoreStep::continue_with(Vec::new())
                }
            },

            SchedulerEvent::StalenessChecked { stale } => {
                if previous == Phase::Checking {
                    self.evaluated_ticks += 1;
                }
                match effect {
                    Some(Effect::SubmitBatch) => {
                        info!(plans = stale.len(), "plans out of date; starting update batch");
                        CoreStep::continue_with(vec![CoreCommand::SubmitBatch(stale)])
                    }
                    _ if previous == Phase::Checking => {
                        debug!("all plans up to date");
                        self.after_idle()
                    }
                    _ => {
                        warn!(phase = ?previous, "unexpected staleness result ignored");
                        CoreStep::continue_with(Vec::new())
                    }
                }
            }

            SchedulerEvent::BatchCompleted { summary } => {
                if previous != Phase::Updating {
                    warn!(phase = ?previous, "batch completion ignored outside an update");
                    return CoreStep::continue_with(Vec::new());
                }
                self.completed_batches += 1;
                info!(
                    succeeded = summary.succeeded(),
                    failed = summary.failed(),
                    "update batch finished"
                );
                self.last_batch = Some(summary);
                self.after_idle()
            }

            SchedulerEvent::HeadAdvanced(update) => {
                let commit = update.commit.short();
                match self.store.advance_head(&update) {
                    HeadAdvance::Applied => {
                        info!(plan = %update.plan, %commit, "head advanced");
                    }
                    HeadAdvance::PlanGone => {
                        warn!(plan = %update.plan, %commit, "plan removed; head update dropped");
                    }
                    HeadAdvance::RepositoryChanged => {
                        warn!(
                            plan = %update.plan,
                            %commit,
                            remote = %update.repository.url,
                            "plan repository changed; head update dropped"
                        );
                    }
                }
                CoreStep::continue_with(Vec::new())
            }

            SchedulerEvent::ShutdownRequested => {
                let mut commands = Vec::new();
                if effect == Some(Effect::CancelBatch) {
                    commands.push(CoreCommand::CancelBatch);
                }
                commands.push(CoreCommand::RequestExit);
                CoreStep {
                    commands,
                    keep_running: false,
                }
            }
        }
    }

    fn after_idle(&self) -> CoreStep {
        if self.options.exit_when_idle {
            info!("scheduler idle; exiting (--once)");
            return CoreStep {
                commands: vec![CoreCommand::RequestExit],
                keep_running: false,
            };
        }
        CoreStep::continue_with(Vec::new())
    }
}
