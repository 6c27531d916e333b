// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HabitatError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A plan (or the config section describing it) lacks a required field.
    #[error("Missing configuration: {0}")]
    MissingConfiguration(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Duplicate plan name: {0}")]
    DuplicatePlan(String),

    #[error("Plan not found: {0}")]
    PlanNotFound(String),

    /// A path expected to be a working copy has no resolvable head.
    #[error("Not a git repository: {}", .0.display())]
    NotAGitRepository(PathBuf),

    #[error("Source control failure: {0}")]
    SourceControlFailure(String),

    /// A build or launch script exited non-zero or failed to start.
    #[error("Script failure: {0}")]
    ScriptFailure(String),

    /// A task result was read before the task finished.
    #[error("Task not finished: {0}")]
    TaskNotFinished(String),

    #[error("Task cancelled: {0}")]
    TaskCancelled(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A dependency of the current task finished with a failure.
    #[error("upstream task '{task}' failed: {source}")]
    UpstreamFailed {
        task: String,
        #[source]
        source: Arc<HabitatError>,
    },

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Scheduler is not running")]
    SchedulerClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, HabitatError>;
