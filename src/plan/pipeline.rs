// src/plan/pipeline.rs

//! Builds the clone → checkout → build → launch task chain for one plan.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::dag::{AsyncTask, Dependencies, TaskGraph, TaskId};
use crate::errors::{HabitatError, Result};
use crate::exec::{ProcessRunner, ScriptStatus};
use crate::plan::locator::AssetLocator;
use crate::plan::model::{Commit, Head, Plan, Repository, Script};
use crate::scm::{RepositoryHandle, SourceControl};

/// Value produced by a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    /// Clone: the freshly cloned working copy.
    Repository(RepositoryHandle),
    /// Checkout: the commit now checked out.
    CheckedOut(Commit),
    /// Build / launch: the script's exit status (always success).
    ScriptCompleted(ScriptStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Clone,
    Checkout,
    Build,
    Launch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Clone => "clone",
            Stage::Checkout => "checkout",
            Stage::Build => "build",
            Stage::Launch => "launch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reported by a successful checkout so the scheduler can advance the
/// plan's `head`.
///
/// Carries the repository the pipeline was built for; the scheduler drops
/// the update if the plan has since been pointed somewhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadUpdate {
    pub plan: String,
    pub repository: Repository,
    pub commit: Commit,
}

pub type HeadSink = mpsc::UnboundedSender<HeadUpdate>;

/// Capabilities shared by every pipeline of a batch.
#[derive(Clone)]
pub struct PipelineContext {
    pub source_control: Arc<dyn SourceControl>,
    pub runner: Arc<dyn ProcessRunner>,
    pub heads: HeadSink,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext").finish_non_exhaustive()
    }
}

/// Task ids of one plan's pipeline inside a batch graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub plan: String,
    pub clone: Option<TaskId>,
    pub checkout: TaskId,
    pub build: TaskId,
    pub launch: TaskId,
}

impl Pipeline {
    /// Stages in execution order.
    pub fn stages(&self) -> Vec<(Stage, TaskId)> {
        let mut out = Vec::with_capacity(4);
        if let Some(clone) = self.clone {
            out.push((Stage::Clone, clone));
        }
        out.push((Stage::Checkout, self.checkout));
        out.push((Stage::Build, self.build));
        out.push((Stage::Launch, self.launch));
        out
    }

    /// The final stage; submitting it as a root pulls in the whole chain.
    pub fn root(&self) -> TaskId {
        self.launch
    }
}

fn label(plan: &str, stage: Stage) -> String {
    format!("{plan}:{stage}")
}

/// Add `plan`'s pipeline to `graph`.
///
/// The tasks capture a copy of the plan, so removing or editing the plan
/// afterwards does not affect a pipeline that is already built.
pub fn build_pipeline(
    graph: &mut TaskGraph<StageOutput>,
    plan: &Plan,
    locator: &AssetLocator,
    ctx: &PipelineContext,
) -> Result<Pipeline> {
    let name = plan.name.clone();
    let working_copy = locator.working_copy(&plan.name);

    let clone = match plan.head {
        Head::NotYetCheckedOut => Some(graph.add_task(clone_task(
            &name,
            plan.repository.url.clone(),
            working_copy.clone(),
            Arc::clone(&ctx.source_control),
        ))),
        Head::Commit(_) => None,
    };

    let checkout = graph.add_task(checkout_task(
        &name,
        plan.repository.clone(),
        working_copy.clone(),
        clone,
        ctx.clone(),
    ));
    if let Some(clone) = clone {
        graph.add_dependency(checkout, clone)?;
    }

    let build = graph.add_task(script_task(
        &name,
        Stage::Build,
        plan.build.clone(),
        working_copy.clone(),
        plan.environment.clone(),
        checkout,
        Arc::clone(&ctx.runner),
    ));
    graph.add_dependency(build, checkout)?;

    let launch = graph.add_task(script_task(
        &name,
        Stage::Launch,
        plan.launch.clone(),
        working_copy,
        plan.environment.clone(),
        build,
        Arc::clone(&ctx.runner),
    ));
    graph.add_dependency(launch, build)?;

    Ok(Pipeline {
        plan: name,
        clone,
        checkout,
        build,
        launch,
    })
}

fn clone_task(
    plan: &str,
    remote: String,
    path: PathBuf,
    scm: Arc<dyn SourceControl>,
) -> AsyncTask<StageOutput> {
    let plan = plan.to_string();
    AsyncTask::new(label(&plan, Stage::Clone), move |_deps| async move {
        info!(plan = %plan, stage = "clone", %remote, path = %path.display(), "cloning repository");
        let repo = scm.clone_repository(&remote, &path).await?;
        Ok(StageOutput::Repository(repo))
    })
}

fn checkout_task(
    plan: &str,
    repository: Repository,
    path: PathBuf,
    clone: Option<TaskId>,
    ctx: PipelineContext,
) -> AsyncTask<StageOutput> {
    let plan = plan.to_string();
    AsyncTask::new(
        label(&plan, Stage::Checkout),
        move |deps: Dependencies<StageOutput>| async move {
            let scm = ctx.source_control.as_ref();
            let branch = repository.branch.clone();

            let repo = match clone {
                Some(clone) => match deps.require(clone)? {
                    StageOutput::Repository(repo) => repo,
                    other => {
                        return Err(HabitatError::Other(anyhow::anyhow!(
                            "clone stage of '{plan}' produced {other:?}"
                        )));
                    }
                },
                None => scm.open_repository(&path).await?,
            };

            let tip = scm.branch_tip_commit(&repo, &branch).await?;
            scm.checkout(&repo, &branch).await?;
            let head = scm.head_commit(&repo).await?;
            if head != tip {
                return Err(HabitatError::SourceControlFailure(format!(
                    "checked out {} in '{}' but branch '{branch}' is at {}",
                    head.short(),
                    path.display(),
                    tip.short()
                )));
            }

            info!(plan = %plan, stage = "checkout", commit = %head.short(), "checked out");
            if ctx
                .heads
                .send(HeadUpdate {
                    plan: plan.clone(),
                    repository,
                    commit: head.clone(),
                })
                .is_err()
            {
                warn!(plan = %plan, "scheduler gone; head update dropped");
            }

            Ok(StageOutput::CheckedOut(head))
        },
    )
}

fn script_task(
    plan: &str,
    stage: Stage,
    script: Script,
    working_copy: PathBuf,
    environment: BTreeMap<String, String>,
    after: TaskId,
    runner: Arc<dyn ProcessRunner>,
) -> AsyncTask<StageOutput> {
    let plan = plan.to_string();
    AsyncTask::new(
        label(&plan, stage),
        move |deps: Dependencies<StageOutput>| async move {
            deps.require(after)?;

            info!(plan = %plan, %stage, %script, "running script");
            let status = runner.run(&script, &working_copy, &environment).await?;
            if !status.is_success() {
                return Err(HabitatError::ScriptFailure(format!(
                    "{stage} script '{script}' of plan '{plan}' failed with {status}"
                )));
            }
            Ok(StageOutput::ScriptCompleted(status))
        },
    )
}
