// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::plan::Plan;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [scheduler]
/// interval = "15s"
/// initial_delay = "10s"
/// tolerance = "60s"
/// workers = 4
///
/// [assets]
/// root = "~/.habitat"
///
/// [plan.api]
/// repository = "https://example.com/api.git"
/// branch = "main"
/// build = "scripts/build.sh"
/// launch = "scripts/launch.sh"
/// environment = { PORT = "8080" }
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub assets: AssetsSection,

    /// All plans from `[plan.<name>]`, keyed by plan name.
    #[serde(default)]
    pub plan: BTreeMap<String, PlanSection>,
}

/// `[scheduler]` section. Durations are strings like `"15s"` or `"250ms"`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    #[serde(default = "default_interval")]
    pub interval: String,

    #[serde(default = "default_initial_delay")]
    pub initial_delay: String,

    #[serde(default = "default_tolerance")]
    pub tolerance: String,

    /// Maximum number of pipeline stages running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_interval() -> String {
    "15s".to_string()
}

fn default_initial_delay() -> String {
    "10s".to_string()
}

fn default_tolerance() -> String {
    "60s".to_string()
}

fn default_workers() -> usize {
    crate::exec::DEFAULT_WORKERS
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            initial_delay: default_initial_delay(),
            tolerance: default_tolerance(),
            workers: default_workers(),
        }
    }
}

/// `[assets]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsSection {
    /// Directory holding one `<plan>/repository` working copy per plan.
    /// A leading `~` is expanded to the home directory.
    #[serde(default = "default_assets_root")]
    pub root: String,
}

fn default_assets_root() -> String {
    "~/.habitat".to_string()
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
        }
    }
}

/// `[plan.<name>]` section.
///
/// Required fields are still `Option` here so a missing one is reported as
/// `MissingConfiguration` naming the plan and field, not as a TOML error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlanSection {
    #[serde(default)]
    pub repository: Option<String>,

    /// Defaults to `master`.
    #[serde(default)]
    pub branch: Option<String>,

    #[serde(default)]
    pub build: Option<String>,

    #[serde(default)]
    pub launch: Option<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Validated scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub initial_delay: Duration,
    pub tolerance: Duration,
    pub workers: usize,
}

/// Validated configuration.
///
/// Can only be obtained through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerSettings,
    pub assets_root: PathBuf,
    /// Plans in name order.
    pub plans: Vec<Plan>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerSettings,
        assets_root: PathBuf,
        plans: Vec<Plan>,
    ) -> Self {
        Self {
            scheduler,
            assets_root,
            plans,
        }
    }
}
