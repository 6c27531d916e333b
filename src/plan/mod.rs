// src/plan/mod.rs

//! Deployment plans and what the agent does with them.
//!
//! - [`model`]: `Plan`, `Repository`, `Commit`, `Script`, `Head`, and the
//!   `PlanBuilder` used at every entry point.
//! - [`validate`]: boundary checks for names, remotes, scripts, env keys.
//! - [`environment`]: `KEY=VALUE` text form of a plan's environment.
//! - [`locator`]: where a plan's working copy lives on disk.
//! - [`staleness`]: whether a plan's remote branch has moved.
//! - [`pipeline`]: the per-plan clone/checkout/build/launch task chain.

pub mod environment;
pub mod locator;
pub mod model;
pub mod pipeline;
pub mod staleness;
pub mod validate;

pub use environment::{format_environment, parse_environment};
pub use locator::AssetLocator;
pub use model::{Commit, Head, Plan, PlanBuilder, Repository, Script, DEFAULT_BRANCH};
pub use pipeline::{
    build_pipeline, HeadSink, HeadUpdate, Pipeline, PipelineContext, Stage, StageOutput,
};
pub use staleness::{check_staleness, needs_update, StaleReason, Staleness};
