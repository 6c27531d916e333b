// src/plan/model.rs

//! Deployment plan data model.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use url::Url;

use crate::errors::{HabitatError, Result};
use crate::plan::validate::{validate_plan, validate_script_location};

/// Branch used when a repository does not name one.
pub const DEFAULT_BRANCH: &str = "master";

/// Remote repository reference: where to clone from, and which branch to
/// deploy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub url: String,
    pub branch: String,
}

impl Repository {
    pub fn new(url: impl Into<String>, branch: Option<String>) -> Self {
        Self {
            url: url.into(),
            branch: branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
        }
    }
}

/// A commit, identified only by its hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Commit {
    pub hash: String,
}

impl Commit {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// First 10 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .hash
            .char_indices()
            .nth(10)
            .map(|(i, _)| i)
            .unwrap_or(self.hash.len());
        &self.hash[..end]
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hash)
    }
}

/// Location of an executable: a local path or a `file://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    location: String,
}

impl Script {
    /// Validates the location before accepting it.
    pub fn new(location: impl Into<String>) -> Result<Self> {
        let location = location.into();
        validate_script_location(&location)?;
        Ok(Self { location })
    }

    /// The location as it was configured.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Filesystem path of the executable. Relative paths are resolved by the
    /// process runner against the working copy.
    pub fn path(&self) -> PathBuf {
        match Url::parse(&self.location) {
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .unwrap_or_else(|_| PathBuf::from(url.path())),
            _ => PathBuf::from(&self.location),
        }
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// What the agent knows about a plan's local working copy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Head {
    /// No working copy is known to exist yet.
    #[default]
    NotYetCheckedOut,
    /// A working copy exists and is checked out at this commit.
    Commit(Commit),
}

impl Head {
    pub fn is_not_yet_checked_out(&self) -> bool {
        matches!(self, Head::NotYetCheckedOut)
    }

    pub fn commit(&self) -> Option<&Commit> {
        match self {
            Head::NotYetCheckedOut => None,
            Head::Commit(c) => Some(c),
        }
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Head::NotYetCheckedOut => f.write_str("not yet checked out"),
            Head::Commit(c) => write!(f, "{}", c.short()),
        }
    }
}

/// A named deployment unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub name: String,
    pub repository: Repository,
    pub head: Head,
    pub build: Script,
    pub launch: Script,
    pub environment: BTreeMap<String, String>,
}

impl Plan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder::default()
    }

    /// Field-for-field equality ignoring `head`.
    pub fn same_definition(&self, other: &Plan) -> bool {
        self.name == other.name
            && self.repository == other.repository
            && self.build == other.build
            && self.launch == other.launch
            && self.environment == other.environment
    }
}

/// Incremental construction of a [`Plan`].
///
/// `build()` reports the first missing required field as
/// [`HabitatError::MissingConfiguration`], then validates the result.
#[derive(Debug, Clone, Default)]
pub struct PlanBuilder {
    name: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    head: Option<Commit>,
    build: Option<String>,
    launch: Option<String>,
    environment: BTreeMap<String, String>,
}

impl PlanBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn repository(mut self, url: impl Into<String>) -> Self {
        self.repository = Some(url.into());
        self
    }

    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    pub fn head(mut self, commit: Commit) -> Self {
        self.head = Some(commit);
        self
    }

    pub fn build_script(mut self, location: impl Into<String>) -> Self {
        self.build = Some(location.into());
        self
    }

    pub fn launch_script(mut self, location: impl Into<String>) -> Self {
        self.launch = Some(location.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn environment(mut self, environment: BTreeMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    pub fn build(self) -> Result<Plan> {
        let name = self.name.ok_or_else(|| missing("<unnamed>", "name"))?;
        let url = self.repository.ok_or_else(|| missing(&name, "repository"))?;
        let build = self.build.ok_or_else(|| missing(&name, "build"))?;
        let launch = self.launch.ok_or_else(|| missing(&name, "launch"))?;

        let plan = Plan {
            repository: Repository::new(url, self.branch),
            head: self.head.map(Head::Commit).unwrap_or_default(),
            build: Script::new(build)?,
            launch: Script::new(launch)?,
            environment: self.environment,
            name,
        };

        validate_plan(&plan)?;
        Ok(plan)
    }
}

fn missing(plan: &str, field: &str) -> HabitatError {
    HabitatError::MissingConfiguration(format!("plan '{plan}' is missing `{field}`"))
}
