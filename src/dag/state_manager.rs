// src/dag/state_manager.rs

//! Per-batch readiness bookkeeping.
//!
//! Pure and synchronous: the executor feeds it "dispatched" and "finished"
//! notifications and it answers which tasks may start next. Kept free of
//! Tokio so it can be tested step by step.

use tracing::debug;

use crate::dag::graph::TaskId;
use crate::dag::task::TaskState;

#[derive(Debug, Clone)]
struct Entry {
    /// Whether the task takes part in this batch at all.
    included: bool,
    state: TaskState,
    /// Dependencies that have not finished yet.
    waiting_on: usize,
    dependents: Vec<TaskId>,
    dispatched: bool,
}

/// Tracks which tasks of a batch are ready, running or finished.
#[derive(Debug, Clone)]
pub struct StateManager {
    entries: Vec<Entry>,
    remaining: usize,
}

impl StateManager {
    /// `deps[i]` lists the dependencies of the task with index `i`;
    /// `included[i]` says whether that task belongs to the batch.
    ///
    /// Dependencies of an included task must themselves be included.
    pub fn new(deps: &[Vec<TaskId>], included: &[bool]) -> Self {
        let mut entries: Vec<Entry> = deps
            .iter()
            .enumerate()
            .map(|(i, d)| Entry {
                included: included.get(i).copied().unwrap_or(false),
                state: TaskState::Ready,
                waiting_on: d.len(),
                dependents: Vec::new(),
                dispatched: false,
            })
            .collect();

        for (i, d) in deps.iter().enumerate() {
            for dep in d {
                if let Some(entry) = entries.get_mut(dep.index()) {
                    entry.dependents.push(TaskId::from_index(i));
                }
            }
        }

        let remaining = entries.iter().filter(|e| e.included).count();

        Self { entries, remaining }
    }

    /// Included tasks with all dependencies finished that have not been
    /// handed out yet. Each task is returned at most once over the lifetime
    /// of the manager.
    pub fn take_ready(&mut self) -> Vec<TaskId> {
        let mut ready = Vec::new();
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if entry.included && !entry.dispatched && entry.waiting_on == 0 {
                entry.dispatched = true;
                ready.push(TaskId::from_index(i));
            }
        }
        ready
    }

    pub fn mark_executing(&mut self, id: TaskId) {
        if let Some(entry) = self.entries.get_mut(id.index()) {
            if entry.state == TaskState::Ready {
                entry.state = TaskState::Executing;
            }
        }
    }

    /// Record that `id` finished (successfully or not) and return the tasks
    /// that became ready as a result.
    pub fn mark_finished(&mut self, id: TaskId) -> Vec<TaskId> {
        let Some(entry) = self.entries.get_mut(id.index()) else {
            return Vec::new();
        };
        if entry.state == TaskState::Finished {
            debug!(%id, "task reported finished twice; ignoring");
            return Vec::new();
        }
        entry.state = TaskState::Finished;
        if entry.included {
            self.remaining -= 1;
        }

        let dependents = entry.dependents.clone();
        for dependent in dependents {
            if let Some(d) = self.entries.get_mut(dependent.index()) {
                d.waiting_on = d.waiting_on.saturating_sub(1);
            }
        }

        self.take_ready()
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.entries.get(id.index()).map(|e| e.state)
    }

    /// State of every task, indexed by [`TaskId`].
    pub fn states(&self) -> Vec<TaskState> {
        self.entries.iter().map(|e| e.state).collect()
    }

    /// Whether every included task has finished.
    pub fn all_finished(&self) -> bool {
        self.remaining == 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }
}
