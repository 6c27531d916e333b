// src/exec/mod.rs

//! Execution layer.
//!
//! - [`executor`] runs task graphs as batches with bounded parallelism and
//!   reports when a whole batch has finished.
//! - [`process`] provides the `ProcessRunner` capability used to run build
//!   and launch scripts, and the `tokio::process` based `ScriptRunner`.

pub mod executor;
pub mod process;

pub use executor::{BatchHandle, BatchReport, Executor, DEFAULT_WORKERS};
pub use process::{ProcessRunner, ScriptRunner, ScriptStatus};
