#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use habitat::engine::{Capabilities, RuntimeOptions, Scheduler, SchedulerHandle, SchedulerOptions};
use habitat::errors::Result;
use habitat::plan::{AssetLocator, Plan};
use habitat::types::{SchedulerState, SchedulerStatus};

pub use habitat_test_utils::builders;
pub use habitat_test_utils::{
    init_tracing, with_timeout, CallLog, FakeRunner, FakeSourceControl, RunnerCall, ScmCall,
};

/// A scheduler wired to fakes, with timers long enough that only manual
/// ticks happen during a test.
pub struct Harness {
    pub scm: FakeSourceControl,
    pub runner: FakeRunner,
    pub log: CallLog,
    pub locator: AssetLocator,
    pub handle: SchedulerHandle,
    pub task: JoinHandle<Result<()>>,
    _root: TempDir,
}

impl Harness {
    pub fn start(plans: Vec<Plan>, scm: FakeSourceControl, runner: FakeRunner) -> Self {
        Self::start_with(plans, scm, runner, RuntimeOptions::default())
    }

    pub fn start_with(
        plans: Vec<Plan>,
        scm: FakeSourceControl,
        runner: FakeRunner,
        runtime: RuntimeOptions,
    ) -> Self {
        let options = SchedulerOptions {
            interval: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(3600),
            runtime,
            ..SchedulerOptions::default()
        };
        Self::start_with_options(plans, scm, runner, options)
    }

    /// Start with explicit timer settings, for tests that drive the clock.
    pub fn start_with_options(
        plans: Vec<Plan>,
        scm: FakeSourceControl,
        runner: FakeRunner,
        options: SchedulerOptions,
    ) -> Self {
        init_tracing();

        let log = CallLog::new();
        let scm = scm.with_log(log.clone());
        let runner = runner.with_log(log.clone());

        let root = tempfile::tempdir().expect("tempdir");
        let locator = AssetLocator::new(root.path());
        let capabilities = Capabilities {
            source_control: Arc::new(scm.clone()),
            runner: Arc::new(runner.clone()),
        };

        let (scheduler, handle) = Scheduler::new(options, locator.clone(), plans, capabilities)
            .expect("scheduler should accept plans");
        let task = tokio::spawn(scheduler.run());

        Self {
            scm,
            runner,
            log,
            locator,
            handle,
            task,
            _root: root,
        }
    }

    /// Trigger a tick and wait until its evaluation, and the batch it
    /// started if any, are done.
    pub async fn tick_and_settle(&self) -> SchedulerStatus {
        let before = self.handle.status();
        self.handle.trigger_tick().await.expect("trigger tick");

        let evaluated = with_timeout(
            self.handle
                .wait_for(|s| s.evaluated_ticks > before.evaluated_ticks),
        )
        .await
        .expect("scheduler closed");

        if evaluated.state == SchedulerState::Idle {
            return evaluated;
        }

        with_timeout(self.handle.wait_for(|s| {
            s.state == SchedulerState::Idle && s.completed_batches > before.completed_batches
        }))
        .await
        .expect("scheduler closed")
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await.expect("shutdown");
        with_timeout(self.task)
            .await
            .expect("scheduler task panicked")
            .expect("scheduler returned an error");
    }
}
