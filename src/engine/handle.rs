// src/engine/handle.rs

//! Management handle: the typed surface a management layer talks to.

use tokio::sync::{mpsc, oneshot, watch};

use crate::engine::summary::BatchSummary;
use crate::errors::{HabitatError, Result};
use crate::plan::Plan;
use crate::types::{SchedulerState, SchedulerStatus};

/// Requests served by the scheduler task, one at a time.
#[derive(Debug)]
pub(crate) enum Request {
    Plans(oneshot::Sender<Vec<Plan>>),
    Plan {
        index: usize,
        reply: oneshot::Sender<Result<Plan>>,
    },
    PlanNamed {
        name: String,
        reply: oneshot::Sender<Result<Plan>>,
    },
    Insert {
        plan: Plan,
        reply: oneshot::Sender<Result<usize>>,
    },
    Replace {
        index: usize,
        plan: Plan,
        reply: oneshot::Sender<Result<()>>,
    },
    Remove {
        index: usize,
        reply: oneshot::Sender<Result<Plan>>,
    },
    RemoveNamed {
        name: String,
        reply: oneshot::Sender<Result<Plan>>,
    },
    LastBatch(oneshot::Sender<Option<BatchSummary>>),
    TriggerTick,
    Shutdown,
}

/// Cloneable handle to a running scheduler.
///
/// Mutations are applied by the scheduler task in arrival order and take
/// effect on the next tick's snapshot. Every call fails with
/// [`HabitatError::SchedulerClosed`] once the scheduler has exited.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SchedulerStatus>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        requests: mpsc::Sender<Request>,
        status: watch::Receiver<SchedulerStatus>,
    ) -> Self {
        Self { requests, status }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(make(reply))
            .await
            .map_err(|_| HabitatError::SchedulerClosed)?;
        rx.await.map_err(|_| HabitatError::SchedulerClosed)
    }

    async fn notify(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| HabitatError::SchedulerClosed)
    }

    /// Every plan, in collection order.
    pub async fn plans(&self) -> Result<Vec<Plan>> {
        self.call(Request::Plans).await
    }

    pub async fn plan(&self, index: usize) -> Result<Plan> {
        self.call(|reply| Request::Plan { index, reply }).await?
    }

    pub async fn plan_named(&self, name: &str) -> Result<Plan> {
        let name = name.to_string();
        self.call(|reply| Request::PlanNamed { name, reply }).await?
    }

    /// Append a plan and return its index. The stored head always starts
    /// as `NotYetCheckedOut`.
    pub async fn insert(&self, plan: Plan) -> Result<usize> {
        self.call(|reply| Request::Insert { plan, reply }).await?
    }

    pub async fn replace(&self, index: usize, plan: Plan) -> Result<()> {
        self.call(|reply| Request::Replace { index, plan, reply })
            .await?
    }

    /// Remove a plan. An in-flight pipeline for it is not cancelled.
    pub async fn remove(&self, index: usize) -> Result<Plan> {
        self.call(|reply| Request::Remove { index, reply }).await?
    }

    pub async fn remove_named(&self, name: &str) -> Result<Plan> {
        let name = name.to_string();
        self.call(|reply| Request::RemoveNamed { name, reply })
            .await?
    }

    /// Latest published state; does not wait for the scheduler.
    pub fn state(&self) -> SchedulerState {
        self.status.borrow().state
    }

    pub fn status(&self) -> SchedulerStatus {
        *self.status.borrow()
    }

    /// A receiver that observes every published status.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status.clone()
    }

    /// Wait until the published status satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SchedulerStatus) -> bool,
    ) -> Result<SchedulerStatus> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(predicate)
            .await
            .map_err(|_| HabitatError::SchedulerClosed)?;
        Ok(*status)
    }

    /// Outcome of the most recently completed batch.
    pub async fn last_batch(&self) -> Result<Option<BatchSummary>> {
        self.call(Request::LastBatch).await
    }

    /// Evaluate plans now instead of waiting for the timer. Ignored while
    /// a batch is in flight.
    pub async fn trigger_tick(&self) -> Result<()> {
        self.notify(Request::TriggerTick).await
    }

    /// Cancel any in-flight batch and stop the scheduler.
    pub async fn shutdown(&self) -> Result<()> {
        self.notify(Request::Shutdown).await
    }
}
