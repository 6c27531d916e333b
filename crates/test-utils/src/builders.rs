#![allow(dead_code)]

use std::collections::BTreeMap;

use habitat::config::model::{PlanSection, RawConfigFile};
use habitat::config::ConfigFile;
use habitat::errors::Result;
use habitat::plan::{Commit, HeadUpdate, Plan, PlanBuilder};

pub const BUILD_SCRIPT: &str = "scripts/build.sh";
pub const LAUNCH_SCRIPT: &str = "scripts/launch.sh";

/// Remote URL used by [`plan`] for a plan called `name`.
pub fn remote_for(name: &str) -> String {
    format!("https://git.example.com/{name}.git")
}

/// A `PlanBuilder` with every required field filled in.
pub fn plan_builder(name: &str) -> PlanBuilder {
    Plan::builder()
        .name(name)
        .repository(remote_for(name))
        .build_script(BUILD_SCRIPT)
        .launch_script(LAUNCH_SCRIPT)
}

/// A valid plan tracking `master` of [`remote_for`]`(name)`.
pub fn plan(name: &str) -> Plan {
    plan_builder(name)
        .build()
        .expect("Failed to build valid plan from builder")
}

/// The update a successful checkout of `plan` at `hash` would report.
pub fn head_update(plan: &Plan, hash: &str) -> HeadUpdate {
    HeadUpdate {
        plan: plan.name.clone(),
        repository: plan.repository.clone(),
        commit: Commit::new(hash),
    }
}

/// Builder for `RawConfigFile` / `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn interval(mut self, value: &str) -> Self {
        self.config.scheduler.interval = value.to_string();
        self
    }

    pub fn initial_delay(mut self, value: &str) -> Self {
        self.config.scheduler.initial_delay = value.to_string();
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.scheduler.workers = workers;
        self
    }

    pub fn assets_root(mut self, root: &str) -> Self {
        self.config.assets.root = root.to_string();
        self
    }

    pub fn with_plan(mut self, name: &str, section: PlanSection) -> Self {
        self.config.plan.insert(name.to_string(), section);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn try_build(self) -> Result<ConfigFile> {
        ConfigFile::try_from(self.config)
    }

    pub fn build(self) -> ConfigFile {
        self.try_build()
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `PlanSection`.
pub struct PlanSectionBuilder {
    section: PlanSection,
}

impl PlanSectionBuilder {
    /// A section with repository, build and launch set.
    pub fn new(repository: &str) -> Self {
        Self {
            section: PlanSection {
                repository: Some(repository.to_string()),
                branch: None,
                build: Some(BUILD_SCRIPT.to_string()),
                launch: Some(LAUNCH_SCRIPT.to_string()),
                environment: BTreeMap::new(),
            },
        }
    }

    pub fn branch(mut self, branch: &str) -> Self {
        self.section.branch = Some(branch.to_string());
        self
    }

    pub fn without_build(mut self) -> Self {
        self.section.build = None;
        self
    }

    pub fn without_launch(mut self) -> Self {
        self.section.launch = None;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.section
            .environment
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> PlanSection {
        self.section
    }
}
