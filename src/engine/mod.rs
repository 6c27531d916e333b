// src/engine/mod.rs

//! Update scheduler.
//!
//! This module ties together:
//! - the plan collection ([`store`])
//! - the pure `Idle`/`Updating` state machine ([`core`])
//! - the async shell that owns the timer, channels and in-flight batch
//!   ([`runtime`])
//! - the management handle used to read and edit plans ([`handle`])
//! - per-plan batch outcomes ([`summary`])

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeOptions {
    /// If true, tick immediately and exit the first time the scheduler is
    /// idle again (used for `--once`).
    pub exit_when_idle: bool,
}

pub mod core;
pub mod handle;
pub mod runtime;
pub mod store;
pub mod summary;

pub use core::{transition, CoreCommand, CoreStep, Effect, Phase, SchedulerCore, SchedulerEvent};
pub use handle::SchedulerHandle;
pub use runtime::{
    Capabilities, Scheduler, SchedulerOptions, DEFAULT_INITIAL_DELAY, DEFAULT_INTERVAL,
    DEFAULT_TOLERANCE,
};
pub use store::{HeadAdvance, PlanStore};
pub use summary::{BatchSummary, PlanOutcome, StageFailure};
