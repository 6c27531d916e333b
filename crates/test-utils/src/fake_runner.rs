use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;

use habitat::errors::{HabitatError, Result};
use habitat::exec::{ProcessRunner, ScriptStatus};
use habitat::plan::Script;
use habitat::types::BoxFuture;

use crate::CallLog;

/// A recorded script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub script: String,
    pub working_dir: PathBuf,
    pub environment: BTreeMap<String, String>,
}

/// A process runner that:
/// - records every script it is asked to run
/// - exits 0, or with a configured code for scripts marked as failing
/// - optionally blocks each run until the test releases it
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<RunnerCall>>>,
    exit_codes: Arc<Mutex<HashMap<String, i32>>>,
    unstartable: Arc<Mutex<Vec<String>>>,
    gate: Option<Arc<Semaphore>>,
    log: CallLog,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every run waits for a [`FakeRunner::release`] before finishing.
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::default()
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Let `n` blocked (or future) runs finish.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Runs of a script whose location equals `location` exit with `code`.
    pub fn exit_with(&self, location: &str, code: i32) {
        self.exit_codes
            .lock()
            .unwrap()
            .insert(location.to_string(), code);
    }

    /// Runs of `location` fail to start at all.
    pub fn fail_to_start(&self, location: &str) {
        self.unstartable.lock().unwrap().push(location.to_string());
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Script locations, in the order they were run.
    pub fn scripts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.script).collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run<'a>(
        &'a self,
        script: &'a Script,
        working_dir: &'a Path,
        environment: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ScriptStatus>> {
        Box::pin(async move {
            let location = script.location().to_string();
            self.log.push(format!("run {location}"));
            self.calls.lock().unwrap().push(RunnerCall {
                script: location.clone(),
                working_dir: working_dir.to_path_buf(),
                environment: environment.clone(),
            });

            if let Some(gate) = &self.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            if self.unstartable.lock().unwrap().contains(&location) {
                return Err(HabitatError::ScriptFailure(format!(
                    "failed to start '{location}'"
                )));
            }

            let code = self
                .exit_codes
                .lock()
                .unwrap()
                .get(&location)
                .copied()
                .unwrap_or(0);
            Ok(ScriptStatus::exited(code))
        })
    }
}
