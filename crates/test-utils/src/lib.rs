pub mod builders;
pub mod fake_runner;
pub mod fake_scm;

use std::sync::{Arc, Mutex, Once};
use tracing_subscriber::{fmt, EnvFilter};

pub use fake_runner::{FakeRunner, RunnerCall};
pub use fake_scm::{FakeSourceControl, ScmCall};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Ordered record of capability calls, shared between fakes so tests can
/// assert on the interleaving of source-control and script calls.
///
/// Entries look like `"clone <remote>"`, `"checkout <path>"`,
/// `"run <script>"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Just the operation names, e.g. `["clone", "branch_tip", ...]`.
    pub fn ops(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|e| e.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }

    /// Entries whose target contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.contains(needle))
            .collect()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}
