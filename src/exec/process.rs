// src/exec/process.rs

//! Process-runner capability for build and launch scripts.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{HabitatError, Result};
use crate::plan::Script;
use crate::types::BoxFuture;

/// Exit status of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptStatus {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ScriptStatus {
    pub fn success() -> Self {
        Self { code: Some(0) }
    }

    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ScriptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("termination by signal"),
        }
    }
}

/// Runs scripts on behalf of the update pipeline.
pub trait ProcessRunner: Send + Sync {
    /// Run `script` in `working_dir` with `environment` layered over the
    /// agent's own environment. Stdout and stderr go to the agent's streams.
    ///
    /// Returns `Err` only if the script could not be started or waited on; a
    /// non-zero exit is reported through [`ScriptStatus`].
    fn run<'a>(
        &'a self,
        script: &'a Script,
        working_dir: &'a Path,
        environment: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ScriptStatus>>;
}

/// Production runner built on `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ScriptRunner;

impl ProcessRunner for ScriptRunner {
    fn run<'a>(
        &'a self,
        script: &'a Script,
        working_dir: &'a Path,
        environment: &'a BTreeMap<String, String>,
    ) -> BoxFuture<'a, Result<ScriptStatus>> {
        Box::pin(async move {
            let mut program = script.path();
            if program.is_relative() {
                program = working_dir.join(program);
            }

            info!(
                script = %script,
                cwd = %working_dir.display(),
                "starting script"
            );

            let mut cmd = Command::new(&program);
            cmd.current_dir(working_dir)
                .envs(environment)
                .stdin(Stdio::null())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());

            let mut child = cmd.spawn().map_err(|e| {
                HabitatError::ScriptFailure(format!(
                    "failed to start {}: {e}",
                    program.display()
                ))
            })?;

            let status = child.wait().await.map_err(|e| {
                HabitatError::ScriptFailure(format!(
                    "failed waiting for {}: {e}",
                    program.display()
                ))
            })?;

            let status = ScriptStatus {
                code: status.code(),
            };
            debug!(script = %script, %status, "script exited");
            Ok(status)
        })
    }
}
