// src/exec/executor.rs

//! Runs a [`TaskGraph`] as one batch.
//!
//! A driver task owns the batch: it asks the [`StateManager`] which tasks
//! are ready, spawns each ready task on its own Tokio task (gated by a
//! shared semaphore that bounds parallelism), and follows the workers over
//! an mpsc channel until every included task is `Finished`. A task counts
//! as `Executing` only once its worker holds a permit.
//!
//! A failing task does not stop the batch. Its dependents still run and
//! see the failure through [`Dependencies::require`].

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::{debug, info, warn};

use crate::dag::{
    AsyncTask, CancelToken, Dependencies, StateManager, TaskGraph, TaskId, TaskResult, TaskState,
};
use crate::errors::{HabitatError, Result};

/// Default number of tasks allowed to execute at the same time.
pub const DEFAULT_WORKERS: usize = 4;

/// Executes task graphs with bounded parallelism.
///
/// Cloning an executor shares its worker limit.
#[derive(Debug, Clone)]
pub struct Executor {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl Executor {
    /// `workers` is clamped to at least 1.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every task in `graph`.
    pub fn submit<V>(&self, graph: TaskGraph<V>) -> Result<BatchHandle<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let all: Vec<TaskId> = graph.ids().collect();
        self.submit_roots(graph, &all)
    }

    /// Run `roots` and every task they transitively depend on. Other tasks
    /// stay `Ready` and report `TaskNotFinished`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit_roots<V>(&self, graph: TaskGraph<V>, roots: &[TaskId]) -> Result<BatchHandle<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        graph.validate()?;
        let included_ids = graph.reachable_from(roots)?;
        let cancels = graph.cancel_tokens();

        let (tasks, deps) = graph.into_parts();
        let included: Vec<bool> = (0..tasks.len())
            .map(|i| included_ids.contains(&TaskId::from_index(i)))
            .collect();

        info!(
            tasks = included_ids.len(),
            workers = self.workers,
            "submitting task batch"
        );

        let (done_tx, done_rx) = oneshot::channel();
        let manager = StateManager::new(&deps, &included);
        let (progress_tx, progress_rx) = watch::channel(manager.states());
        let driver = BatchDriver {
            slots: tasks.into_iter().map(Some).collect(),
            deps,
            manager,
            permits: Arc::clone(&self.permits),
            progress: progress_tx,
        };
        tokio::spawn(driver.run(done_tx, included_ids.len()));

        Ok(BatchHandle {
            cancels,
            progress: progress_rx,
            done: done_rx,
        })
    }
}

/// Handle to a running batch.
#[derive(Debug)]
pub struct BatchHandle<V> {
    cancels: Vec<CancelToken>,
    progress: watch::Receiver<Vec<TaskState>>,
    done: oneshot::Receiver<BatchReport<V>>,
}

impl<V> BatchHandle<V> {
    /// The driver's current view of task `id`.
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.progress.borrow().get(id.index()).copied()
    }

    /// Ask every task in the batch to cancel. Tasks that already started
    /// run to completion.
    pub fn cancel(&self) {
        for token in &self.cancels {
            token.cancel();
        }
    }

    /// Tokens that cancel the batch, for holders that outlive the handle.
    pub fn cancel_tokens(&self) -> Vec<CancelToken> {
        self.cancels.clone()
    }

    /// Resolve once every task in the batch has finished.
    pub async fn wait(self) -> Result<BatchReport<V>> {
        self.done.await.map_err(|_| {
            HabitatError::Other(anyhow::anyhow!("batch driver stopped before completion"))
        })
    }
}

/// Final state of every task in a batch.
#[derive(Debug)]
pub struct BatchReport<V> {
    /// Indexed by [`TaskId`]; `None` only if a worker was lost.
    tasks: Vec<Option<AsyncTask<V>>>,
}

impl<V> BatchReport<V>
where
    V: Clone + Send + 'static,
{
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&AsyncTask<V>> {
        self.tasks.get(id.index()).and_then(Option::as_ref)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.task(id).map(AsyncTask::state)
    }

    pub fn result(&self, id: TaskId) -> std::result::Result<&V, Arc<HabitatError>> {
        match self.task(id) {
            Some(task) => task.result(),
            None => Err(Arc::new(HabitatError::TaskNotFound(id.to_string()))),
        }
    }

    /// Labels and errors of every finished task that failed.
    pub fn failures(&self) -> Vec<(&str, Arc<HabitatError>)> {
        self.tasks
            .iter()
            .flatten()
            .filter(|t| t.is_finished())
            .filter_map(|t| t.result().err().map(|e| (t.label(), e)))
            .collect()
    }
}

/// Sent by a worker to the batch driver.
enum WorkerEvent<V> {
    /// The task holds a permit and is about to run.
    Started(TaskId),
    Finished(TaskId, AsyncTask<V>),
    /// The worker went away without handing its task back.
    Lost(TaskId),
}

/// A worker's line back to the driver. Dropping it before `finished`
/// (the worker panicked or was aborted) reports the task as lost.
struct WorkerReport<V> {
    id: TaskId,
    events: Option<mpsc::UnboundedSender<WorkerEvent<V>>>,
}

impl<V> WorkerReport<V> {
    fn started(&self) {
        if let Some(events) = &self.events {
            let _ = events.send(WorkerEvent::Started(self.id));
        }
    }

    fn finished(mut self, task: AsyncTask<V>) {
        if let Some(events) = self.events.take() {
            let _ = events.send(WorkerEvent::Finished(self.id, task));
        }
    }
}

impl<V> Drop for WorkerReport<V> {
    fn drop(&mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.send(WorkerEvent::Lost(self.id));
        }
    }
}

struct BatchDriver<V> {
    /// `None` while the task is out on a worker, or if its worker was lost.
    slots: Vec<Option<AsyncTask<V>>>,
    deps: Vec<Vec<TaskId>>,
    manager: StateManager,
    permits: Arc<Semaphore>,
    progress: watch::Sender<Vec<TaskState>>,
}

impl<V> BatchDriver<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn run(mut self, done: oneshot::Sender<BatchReport<V>>, included: usize) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<WorkerEvent<V>>();

        let mut ready = self.manager.take_ready();

        loop {
            for id in ready.drain(..) {
                self.dispatch(id, &events_tx);
            }

            if self.manager.all_finished() {
                break;
            }

            // The driver holds a sender, so this only ends on an event.
            let Some(event) = events_rx.recv().await else {
                break;
            };
            match event {
                WorkerEvent::Started(id) => self.manager.mark_executing(id),
                WorkerEvent::Finished(id, task) => {
                    match task.result() {
                        Ok(_) => debug!(task = %task.label(), "task finished"),
                        Err(e) => warn!(task = %task.label(), error = %e, "task failed"),
                    }
                    self.slots[id.index()] = Some(task);
                    ready = self.manager.mark_finished(id);
                }
                WorkerEvent::Lost(id) => {
                    warn!(%id, "worker lost before its task finished");
                    ready = self.manager.mark_finished(id);
                }
            }
            self.progress.send_replace(self.manager.states());
        }

        info!(tasks = included, "task batch finished");

        let report = BatchReport { tasks: self.slots };
        if done.send(report).is_err() {
            debug!("batch handle dropped before completion was reported");
        }
    }

    fn dispatch(&mut self, id: TaskId, events: &mpsc::UnboundedSender<WorkerEvent<V>>) {
        let Some(mut task) = self.slots[id.index()].take() else {
            warn!(%id, "ready task is not available for dispatch");
            return;
        };

        let deps = self.collect_dependencies(id);
        let permits = Arc::clone(&self.permits);
        let report = WorkerReport {
            id,
            events: Some(events.clone()),
        };

        tokio::spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = permits.acquire_owned().await.ok();
            report.started();
            debug!(task = %task.label(), "task starting");
            task.run(deps).await;
            report.finished(task);
        });
    }

    fn collect_dependencies(&self, id: TaskId) -> Dependencies<V> {
        let mut deps = Dependencies::none();
        for &dep in &self.deps[id.index()] {
            match self.slots[dep.index()].as_ref() {
                Some(task) => deps.push(dep, task.label(), task.result_slot()),
                None => deps.push(dep, &dep.to_string(), None::<TaskResult<V>>),
            }
        }
        deps
    }
}
