// src/plan/locator.rs

use std::path::{Path, PathBuf};

/// Directory name of the working copy inside a plan's asset directory.
const WORKING_COPY_DIR: &str = "repository";

/// Maps plan names to deterministic locations under a root directory.
///
/// `<root>/<plan>/repository` holds the plan's working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocator {
    root: PathBuf,
}

impl AssetLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plan_dir(&self, plan: &str) -> PathBuf {
        self.root.join(plan)
    }

    pub fn working_copy(&self, plan: &str) -> PathBuf {
        self.plan_dir(plan).join(WORKING_COPY_DIR)
    }
}
