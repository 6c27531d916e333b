// src/scm/mod.rs

//! Source-control capability.
//!
//! The scheduler and the update pipeline only talk to [`SourceControl`];
//! [`git::GitCli`] is the production implementation, tests use an
//! in-memory fake.

use std::path::{Path, PathBuf};

use crate::errors::Result;
use crate::plan::Commit;
use crate::types::BoxFuture;

pub mod git;

pub use git::GitCli;

/// Remote every working copy is cloned from and fetched against.
pub const DEFAULT_REMOTE: &str = "origin";

/// An opened local working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    path: PathBuf,
}

impl RepositoryHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Operations the core needs from a source-control client.
///
/// All calls may block on the network or disk for a long time; callers run
/// them on worker tasks, never on the scheduler's own task.
pub trait SourceControl: Send + Sync {
    /// Clone `remote` into `path`, creating parent directories as needed.
    ///
    /// If `path` already holds a working copy it is kept: its default remote
    /// is pointed at `remote` and fetched, so a checkout afterwards sees the
    /// new remote's tips.
    fn clone_repository<'a>(
        &'a self,
        remote: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<RepositoryHandle>>;

    /// Open an existing working copy. Fails with `NotAGitRepository` if
    /// `path` is not one.
    fn open_repository<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<RepositoryHandle>>;

    fn fetch<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Tip of `branch` on the default remote, as of the last fetch.
    fn branch_tip_commit<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Commit>>;

    /// Commit currently checked out in the working copy.
    fn head_commit<'a>(&'a self, repo: &'a RepositoryHandle) -> BoxFuture<'a, Result<Commit>>;

    /// Check out the remote tip of `branch` into the working copy.
    fn checkout<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<()>>;
}
