// src/dag/mod.rs

//! Asynchronous tasks and the graphs they form.
//!
//! - [`task`] holds [`AsyncTask`], its lifecycle and result slot.
//! - [`graph`] holds [`TaskGraph`], a `petgraph`-backed DAG of tasks
//!   addressed by [`TaskId`].
//! - [`state_manager`] decides which tasks of a running batch are ready.

pub mod graph;
pub mod state_manager;
pub mod task;

pub use graph::{TaskGraph, TaskId};
pub use state_manager::StateManager;
pub use task::{AsyncTask, CancelToken, Dependencies, TaskResult, TaskState};
