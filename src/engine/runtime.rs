// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::dag::{CancelToken, TaskGraph};
use crate::errors::{HabitatError, Result};
use crate::exec::{Executor, ProcessRunner, DEFAULT_WORKERS};
use crate::plan::{
    build_pipeline, check_staleness, AssetLocator, HeadSink, HeadUpdate, Pipeline,
    PipelineContext, Plan, Staleness, StageOutput,
};
use crate::scm::SourceControl;
use crate::types::{SchedulerState, SchedulerStatus};

use super::core::{CoreCommand, SchedulerCore, SchedulerEvent};
use super::handle::{Request, SchedulerHandle};
use super::store::PlanStore;
use super::summary::BatchSummary;
use super::RuntimeOptions;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(10);
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(60);

const REQUEST_QUEUE: usize = 64;

/// Timer and executor settings for a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub interval: Duration,
    pub initial_delay: Duration,
    /// How late a tick may fire before it is reported.
    pub tolerance: Duration,
    pub workers: usize,
    pub runtime: RuntimeOptions,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            initial_delay: DEFAULT_INITIAL_DELAY,
            tolerance: DEFAULT_TOLERANCE,
            workers: DEFAULT_WORKERS,
            runtime: RuntimeOptions::default(),
        }
    }
}

/// External capabilities the scheduler drives.
#[derive(Clone)]
pub struct Capabilities {
    pub source_control: Arc<dyn SourceControl>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Async shell around [`SchedulerCore`].
///
/// Owns the timer and every channel. Events are fed to the core one at a
/// time and the resulting commands are carried out here; staleness checks
/// and pipelines run on their own Tokio tasks and report back as events.
pub struct Scheduler {
    core: SchedulerCore,
    options: SchedulerOptions,
    locator: AssetLocator,
    executor: Executor,
    capabilities: Capabilities,
    requests: mpsc::Receiver<Request>,
    events_tx: mpsc::UnboundedSender<SchedulerEvent>,
    events_rx: mpsc::UnboundedReceiver<SchedulerEvent>,
    heads_tx: HeadSink,
    heads_rx: mpsc::UnboundedReceiver<HeadUpdate>,
    status: watch::Sender<SchedulerStatus>,
    in_flight: Vec<CancelToken>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("core", &self.core)
            .field("options", &self.options)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler seeded with `plans` and the handle that talks to
    /// it. Fails if a plan is invalid or two plans share a name.
    pub fn new(
        options: SchedulerOptions,
        locator: AssetLocator,
        plans: Vec<Plan>,
        capabilities: Capabilities,
    ) -> Result<(Self, SchedulerHandle)> {
        let mut store = PlanStore::new();
        for plan in plans {
            store.insert(plan)?;
        }

        let core = SchedulerCore::new(store, options.runtime);
        let (status, status_rx) = watch::channel(core.status());
        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (heads_tx, heads_rx) = mpsc::unbounded_channel();

        let scheduler = Self {
            core,
            options,
            locator,
            executor: Executor::new(options.workers),
            capabilities,
            requests,
            events_tx,
            events_rx,
            heads_tx,
            heads_rx,
            status,
            in_flight: Vec::new(),
        };
        Ok((scheduler, SchedulerHandle::new(requests_tx, status_rx)))
    }

    /// Main loop. Returns after a shutdown request, or once idle in
    /// `exit_when_idle` mode.
    pub async fn run(mut self) -> Result<()> {
        let delay = if self.options.runtime.exit_when_idle {
            Duration::ZERO
        } else {
            self.options.initial_delay
        };
        let mut ticker = time::interval_at(Instant::now() + delay, self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut requests_open = true;

        info!(
            plans = self.core.store().len(),
            interval = ?self.options.interval,
            initial_delay = ?delay,
            root = %self.locator.root().display(),
            "scheduler started"
        );

        loop {
            // Head updates go first so a batch's checkouts are applied
            // before its completion is processed.
            let event = tokio::select! {
                biased;
                Some(update) = self.heads_rx.recv() => SchedulerEvent::HeadAdvanced(update),
                Some(event) = self.events_rx.recv() => event,
                request = self.requests.recv(), if requests_open => match request {
                    Some(request) => match self.handle_request(request) {
                        Some(event) => event,
                        None => continue,
                    },
                    None => {
                        debug!("all scheduler handles dropped");
                        requests_open = false;
                        continue;
                    }
                },
                scheduled = ticker.tick() => {
                    let late = Instant::now().saturating_duration_since(scheduled);
                    if late > self.options.tolerance {
                        warn!(late = ?late, tolerance = ?self.options.tolerance, "tick fired late");
                    }
                    SchedulerEvent::Tick
                }
            };

            debug!(?event, "scheduler received event");
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command);
            }

            if self.core.status().state == SchedulerState::Idle {
                self.in_flight.clear();
            }
            self.status.send_replace(self.core.status());

            if !step.keep_running {
                break;
            }
        }

        info!("scheduler exiting");
        Ok(())
    }

    fn handle_request(&mut self, request: Request) -> Option<SchedulerEvent> {
        if let Request::LastBatch(reply) = request {
            let _ = reply.send(self.core.last_batch().cloned());
            return None;
        }

        let store = self.core.store_mut();
        match request {
            Request::Plans(reply) => {
                let _ = reply.send(store.snapshot());
            }
            Request::Plan { index, reply } => {
                let plan = store
                    .get(index)
                    .cloned()
                    .ok_or_else(|| HabitatError::PlanNotFound(format!("index {index}")));
                let _ = reply.send(plan);
            }
            Request::PlanNamed { name, reply } => {
                let plan = store
                    .find(&name)
                    .map(|(_, p)| p.clone())
                    .ok_or(HabitatError::PlanNotFound(name));
                let _ = reply.send(plan);
            }
            Request::Insert { plan, reply } => {
                let name = plan.name.clone();
                let result = store.insert(plan);
                match &result {
                    Ok(index) => info!(plan = %name, index, "plan added"),
                    Err(e) => warn!(plan = %name, error = %e, "plan rejected"),
                }
                let _ = reply.send(result);
            }
            Request::Replace { index, plan, reply } => {
                let name = plan.name.clone();
                let result = store.replace(index, plan);
                match &result {
                    Ok(()) => info!(plan = %name, index, "plan replaced"),
                    Err(e) => warn!(plan = %name, index, error = %e, "replacement rejected"),
                }
                let _ = reply.send(result);
            }
            Request::Remove { index, reply } => {
                let result = store.remove(index);
                if let Ok(plan) = &result {
                    info!(plan = %plan.name, index, "plan removed");
                }
                let _ = reply.send(result);
            }
            Request::RemoveNamed { name, reply } => {
                let result = store.remove_named(&name);
                if result.is_ok() {
                    info!(plan = %name, "plan removed");
                }
                let _ = reply.send(result);
            }
            Request::LastBatch(_) => {}
            Request::TriggerTick => {
                debug!("manual tick requested");
                return Some(SchedulerEvent::Tick);
            }
            Request::Shutdown => {
                info!("shutdown requested");
                return Some(SchedulerEvent::ShutdownRequested);
            }
        }
        None
    }

    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::CheckStaleness(plans) => self.spawn_staleness_check(plans),
            CoreCommand::SubmitBatch(plans) => self.submit_batch(plans),
            CoreCommand::CancelBatch => {
                info!(tasks = self.in_flight.len(), "cancelling in-flight batch");
                for token in &self.in_flight {
                    token.cancel();
                }
            }
            CoreCommand::RequestExit => debug!("core requested exit"),
        }
    }

    fn spawn_staleness_check(&self, plans: Vec<Plan>) {
        let scm = Arc::clone(&self.capabilities.source_control);
        let locator = self.locator.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let stale = stale_plans(plans, locator, scm).await;
            let _ = events.send(SchedulerEvent::StalenessChecked { stale });
        });
    }

    fn submit_batch(&mut self, plans: Vec<Plan>) {
        let ctx = PipelineContext {
            source_control: Arc::clone(&self.capabilities.source_control),
            runner: Arc::clone(&self.capabilities.runner),
            heads: self.heads_tx.clone(),
        };

        let mut graph = TaskGraph::<StageOutput>::new();
        let mut pipelines: Vec<Pipeline> = Vec::with_capacity(plans.len());
        for plan in &plans {
            match build_pipeline(&mut graph, plan, &self.locator, &ctx) {
                Ok(pipeline) => pipelines.push(pipeline),
                Err(e) => error!(plan = %plan.name, error = %e, "could not build pipeline"),
            }
        }

        let roots: Vec<_> = pipelines.iter().map(Pipeline::root).collect();
        let events = self.events_tx.clone();

        let handle = match self.executor.submit_roots(graph, &roots) {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "could not submit update batch");
                let _ = events.send(SchedulerEvent::BatchCompleted {
                    summary: BatchSummary::default(),
                });
                return;
            }
        };
        self.in_flight = handle.cancel_tokens();

        tokio::spawn(async move {
            let summary = match handle.wait().await {
                Ok(report) => BatchSummary::from_report(&pipelines, &report),
                Err(e) => {
                    error!(error = %e, "update batch lost");
                    BatchSummary::default()
                }
            };

            for outcome in &summary.outcomes {
                match &outcome.result {
                    Ok(commit) => info!(plan = %outcome.plan, commit = %commit.short(), "plan deployed"),
                    Err(failure) => error!(
                        plan = %outcome.plan,
                        stage = %failure.stage,
                        error = %failure.message,
                        "pipeline failed"
                    ),
                }
            }

            let _ = events.send(SchedulerEvent::BatchCompleted { summary });
        });
    }
}

/// Check every plan concurrently and return the stale ones in snapshot
/// order.
async fn stale_plans(
    plans: Vec<Plan>,
    locator: AssetLocator,
    scm: Arc<dyn SourceControl>,
) -> Vec<Plan> {
    let mut checks = JoinSet::new();
    for (index, plan) in plans.into_iter().enumerate() {
        let locator = locator.clone();
        let scm = Arc::clone(&scm);
        checks.spawn(async move {
            let staleness = check_staleness(&plan, &locator, scm.as_ref()).await;
            (index, plan, staleness)
        });
    }

    let mut stale = Vec::new();
    while let Some(joined) = checks.join_next().await {
        let (index, plan, staleness) = match joined {
            Ok(checked) => checked,
            Err(e) => {
                warn!(error = %e, "staleness check aborted");
                continue;
            }
        };
        match &staleness {
            Staleness::Stale(_) => info!(plan = %plan.name, %staleness, "plan is stale"),
            Staleness::NotStale => debug!(plan = %plan.name, "plan is up to date"),
            Staleness::CheckFailed(reason) => {
                warn!(plan = %plan.name, %reason, "staleness check failed; skipping plan")
            }
        }
        if staleness.needs_update() {
            stale.push((index, plan));
        }
    }

    stale.sort_by_key(|(index, _)| *index);
    stale.into_iter().map(|(_, plan)| plan).collect()
}
