// src/dag/task.rs

//! The asynchronous task: one unit of work with a result slot, a monotonic
//! lifecycle and a cooperative cancellation flag.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::dag::graph::TaskId;
use crate::errors::{HabitatError, Result};
use crate::types::BoxFuture;

/// Lifecycle of a task. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskState {
    Ready,
    Executing,
    Finished,
}

/// Value or failure stored in a finished task's result slot.
///
/// Failures are shared so dependents can observe them without taking them
/// away from the task that produced them.
pub type TaskResult<V> = std::result::Result<V, Arc<HabitatError>>;

type TaskWork<V> = Box<dyn FnOnce(Dependencies<V>) -> BoxFuture<'static, Result<V>> + Send>;

/// Cooperative cancellation flag, shared between a task and whoever may
/// want to cancel it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A unit of asynchronous work producing a `V` or a [`HabitatError`].
///
/// The work function runs at most once. Cancellation is advisory: it only
/// prevents a task that has not started from running its body. If a task
/// is cancelled mid-way, whatever it already changed on disk stays changed.
pub struct AsyncTask<V> {
    label: String,
    state: TaskState,
    work: Option<TaskWork<V>>,
    cancel: CancelToken,
    result: Option<TaskResult<V>>,
}

impl<V> fmt::Debug for AsyncTask<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncTask")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<V> AsyncTask<V>
where
    V: Clone + Send + 'static,
{
    pub fn new<F, Fut>(label: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(Dependencies<V>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        Self {
            label: label.into(),
            state: TaskState::Ready,
            work: Some(Box::new(move |deps| Box::pin(work(deps)))),
            cancel: CancelToken::new(),
            result: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.state == TaskState::Finished
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Run the task to completion.
    ///
    /// The work function is spawned on its own Tokio task so that a panic
    /// inside it is captured as a failure instead of tearing down the
    /// caller. Calling `run` on a task that already left `Ready` is a no-op.
    pub async fn run(&mut self, deps: Dependencies<V>) {
        if self.state != TaskState::Ready {
            warn!(task = %self.label, state = ?self.state, "run called twice; ignoring");
            return;
        }

        if self.cancel.is_cancelled() {
            debug!(task = %self.label, "cancelled before start");
            self.finish(Err(HabitatError::TaskCancelled(self.label.clone())));
            return;
        }

        let Some(work) = self.work.take() else {
            self.finish(Err(HabitatError::TaskNotFound(format!(
                "task '{}' has no work function",
                self.label
            ))));
            return;
        };

        self.state = TaskState::Executing;

        // Called inside the spawned task so a work function that panics
        // before returning its future is captured too.
        let outcome = match tokio::spawn(async move { work(deps).await }).await {
            Ok(res) => res,
            Err(join_err) => Err(HabitatError::Other(anyhow::anyhow!(
                "task '{}' aborted: {join_err}",
                self.label
            ))),
        };

        self.finish(outcome);
    }

    fn finish(&mut self, outcome: Result<V>) {
        self.result = Some(outcome.map_err(Arc::new));
        self.state = TaskState::Finished;
    }

    /// The task's value, or its failure.
    ///
    /// Before the task has finished this returns `TaskNotFinished`; it never
    /// waits.
    pub fn result(&self) -> std::result::Result<&V, Arc<HabitatError>> {
        match &self.result {
            Some(Ok(v)) => Ok(v),
            Some(Err(e)) => Err(Arc::clone(e)),
            None => Err(Arc::new(HabitatError::TaskNotFinished(self.label.clone()))),
        }
    }

    /// A clone of the result slot, `None` while unfinished.
    pub(crate) fn result_slot(&self) -> Option<TaskResult<V>> {
        self.result.clone()
    }
}

/// Results of a task's direct dependencies, handed to its work function.
#[derive(Debug, Clone)]
pub struct Dependencies<V> {
    entries: Vec<DependencyResult<V>>,
}

#[derive(Debug, Clone)]
struct DependencyResult<V> {
    id: TaskId,
    label: String,
    result: Option<TaskResult<V>>,
}

impl<V: Clone> Dependencies<V> {
    pub fn none() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, id: TaskId, label: &str, result: Option<TaskResult<V>>) {
        self.entries.push(DependencyResult {
            id,
            label: label.to_string(),
            result,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|e| e.id)
    }

    /// The dependency's value, or the reason it is unavailable:
    /// - `UpstreamFailed` if the dependency failed,
    /// - `TaskNotFinished` if it has not finished (executor contract broken),
    /// - `TaskNotFound` if `id` is not a dependency of this task.
    pub fn require(&self, id: TaskId) -> Result<V> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| HabitatError::TaskNotFound(format!("{id} is not a dependency")))?;

        match &entry.result {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(e)) => Err(HabitatError::UpstreamFailed {
                task: entry.label.clone(),
                source: Arc::clone(e),
            }),
            None => Err(HabitatError::TaskNotFinished(entry.label.clone())),
        }
    }

    /// Fail with the first unavailable dependency, if any.
    pub fn require_all(&self) -> Result<Vec<V>> {
        self.entries.iter().map(|e| self.require(e.id)).collect()
    }
}
