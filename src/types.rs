use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed, sendable future used at the capability seams (source control,
/// process runner, task work functions).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Publicly observable scheduler state.
///
/// - `Idle`: no update batch is in flight. Staleness checks triggered by a
///   tick also report `Idle`, since no work has been submitted yet.
/// - `Updating`: a batch of pipelines is running; ticks are ignored until
///   the batch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulerState {
    #[default]
    Idle,
    Updating,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Idle => f.write_str("idle"),
            SchedulerState::Updating => f.write_str("updating"),
        }
    }
}

/// Snapshot published by the scheduler after every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    /// Number of batches that have completed since startup.
    pub completed_batches: u64,
    /// Number of ticks whose staleness evaluation has finished. Ticks
    /// ignored while busy are not counted.
    pub evaluated_ticks: u64,
}
