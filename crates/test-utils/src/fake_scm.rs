use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use habitat::errors::{HabitatError, Result};
use habitat::plan::Commit;
use habitat::scm::{RepositoryHandle, SourceControl};
use habitat::types::BoxFuture;

use crate::CallLog;

/// A recorded source-control call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
    Clone { remote: String, path: PathBuf },
    Open { path: PathBuf },
    Fetch { path: PathBuf, remote: String },
    BranchTip { path: PathBuf, branch: String },
    Head { path: PathBuf },
    Checkout { path: PathBuf, branch: String },
}

#[derive(Debug, Clone)]
struct WorkingCopy {
    remote: String,
    /// Remote branch tips as of the last clone or fetch.
    fetched: HashMap<String, String>,
    head: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    /// remote url -> branch -> commit hash
    remotes: HashMap<String, HashMap<String, String>>,
    copies: HashMap<PathBuf, WorkingCopy>,
    calls: Vec<ScmCall>,
    fail_clone: HashSet<String>,
    fail_fetch: HashSet<String>,
    fail_checkout: HashSet<String>,
    /// Remotes whose checkout lands on this commit instead of the tip.
    misplaced_checkout: HashMap<String, String>,
}

/// In-memory source control.
///
/// Remotes are maps of branch name to commit hash; working copies are
/// keyed by path and only change through clone, fetch and checkout, like
/// a real clone would.
#[derive(Debug, Clone, Default)]
pub struct FakeSourceControl {
    state: Arc<Mutex<State>>,
    log: CallLog,
}

impl FakeSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share `log` with other fakes.
    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Create or move `branch` of `remote` to `hash`.
    pub fn set_branch(&self, remote: &str, branch: &str, hash: &str) {
        self.state
            .lock()
            .unwrap()
            .remotes
            .entry(remote.to_string())
            .or_default()
            .insert(branch.to_string(), hash.to_string());
    }

    /// Pretend `path` already holds a clone of `remote` checked out at
    /// `head`, fetched at the remote's current state.
    pub fn add_working_copy(&self, path: impl Into<PathBuf>, remote: &str, head: &str) {
        let mut state = self.state.lock().unwrap();
        let fetched = state.remotes.get(remote).cloned().unwrap_or_default();
        state.copies.insert(
            path.into(),
            WorkingCopy {
                remote: remote.to_string(),
                fetched,
                head: Some(head.to_string()),
            },
        );
    }

    pub fn fail_clone(&self, remote: &str) {
        self.state.lock().unwrap().fail_clone.insert(remote.to_string());
    }

    pub fn fail_fetch(&self, remote: &str) {
        self.state.lock().unwrap().fail_fetch.insert(remote.to_string());
    }

    pub fn fail_checkout(&self, remote: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_checkout
            .insert(remote.to_string());
    }

    /// Make checkouts of `remote` land on `hash` regardless of the tip.
    pub fn misplace_checkout(&self, remote: &str, hash: &str) {
        self.state
            .lock()
            .unwrap()
            .misplaced_checkout
            .insert(remote.to_string(), hash.to_string());
    }

    pub fn calls(&self) -> Vec<ScmCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Remote the working copy at `path` fetches from.
    pub fn remote_of(&self, path: &Path) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .copies
            .get(path)
            .map(|c| c.remote.clone())
    }

    /// Commit checked out at `path`, if a working copy exists there.
    pub fn head_of(&self, path: &Path) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .copies
            .get(path)
            .and_then(|c| c.head.clone())
    }

    fn record(&self, state: &mut State, call: ScmCall) {
        let entry = match &call {
            ScmCall::Clone { remote, .. } => format!("clone {remote}"),
            ScmCall::Open { path } => format!("open {}", path.display()),
            ScmCall::Fetch { path, .. } => format!("fetch {}", path.display()),
            ScmCall::BranchTip { path, .. } => format!("branch_tip {}", path.display()),
            ScmCall::Head { path } => format!("head {}", path.display()),
            ScmCall::Checkout { path, .. } => format!("checkout {}", path.display()),
        };
        self.log.push(entry);
        state.calls.push(call);
    }

    fn do_clone(&self, remote: &str, path: &Path) -> Result<RepositoryHandle> {
        let mut state = self.state.lock().unwrap();
        self.record(
            &mut state,
            ScmCall::Clone {
                remote: remote.to_string(),
                path: path.to_path_buf(),
            },
        );

        let Some(branches) = state.remotes.get(remote).cloned() else {
            return Err(HabitatError::SourceControlFailure(format!(
                "remote '{remote}' does not exist"
            )));
        };

        // An existing copy is re-pointed at `remote` and fetched; its
        // checked-out commit stays until the next checkout.
        if state.copies.contains_key(path) {
            if state.fail_fetch.contains(remote) {
                return Err(HabitatError::SourceControlFailure(format!(
                    "fetch from '{remote}' timed out"
                )));
            }
            if let Some(copy) = state.copies.get_mut(path) {
                copy.remote = remote.to_string();
                copy.fetched = branches;
            }
            return Ok(RepositoryHandle::new(path));
        }

        if state.fail_clone.contains(remote) {
            return Err(HabitatError::SourceControlFailure(format!(
                "clone of '{remote}' refused"
            )));
        }
        state.copies.insert(
            path.to_path_buf(),
            WorkingCopy {
                remote: remote.to_string(),
                fetched: branches,
                head: None,
            },
        );
        Ok(RepositoryHandle::new(path))
    }

    fn do_open(&self, path: &Path) -> Result<RepositoryHandle> {
        let mut state = self.state.lock().unwrap();
        self.record(
            &mut state,
            ScmCall::Open {
                path: path.to_path_buf(),
            },
        );
        if state.copies.contains_key(path) {
            Ok(RepositoryHandle::new(path))
        } else {
            Err(HabitatError::NotAGitRepository(path.to_path_buf()))
        }
    }

    fn do_fetch(&self, repo: &RepositoryHandle, remote: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let path = repo.path().to_path_buf();
        self.record(
            &mut state,
            ScmCall::Fetch {
                path: path.clone(),
                remote: remote.to_string(),
            },
        );

        let url = copy(&state, &path)?.remote.clone();
        if state.fail_fetch.contains(&url) {
            return Err(HabitatError::SourceControlFailure(format!(
                "fetch from '{url}' timed out"
            )));
        }
        let branches = state.remotes.get(&url).cloned().unwrap_or_default();
        if let Some(copy) = state.copies.get_mut(&path) {
            copy.fetched = branches;
        }
        Ok(())
    }

    fn do_branch_tip(&self, repo: &RepositoryHandle, branch: &str) -> Result<Commit> {
        let mut state = self.state.lock().unwrap();
        let path = repo.path().to_path_buf();
        self.record(
            &mut state,
            ScmCall::BranchTip {
                path: path.clone(),
                branch: branch.to_string(),
            },
        );

        copy(&state, &path)?
            .fetched
            .get(branch)
            .map(Commit::new)
            .ok_or_else(|| {
                HabitatError::SourceControlFailure(format!("unknown branch 'origin/{branch}'"))
            })
    }

    fn do_head(&self, repo: &RepositoryHandle) -> Result<Commit> {
        let mut state = self.state.lock().unwrap();
        let path = repo.path().to_path_buf();
        self.record(&mut state, ScmCall::Head { path: path.clone() });

        copy(&state, &path)?
            .head
            .as_ref()
            .map(Commit::new)
            .ok_or(HabitatError::NotAGitRepository(path))
    }

    fn do_checkout(&self, repo: &RepositoryHandle, branch: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let path = repo.path().to_path_buf();
        self.record(
            &mut state,
            ScmCall::Checkout {
                path: path.clone(),
                branch: branch.to_string(),
            },
        );

        let current = copy(&state, &path)?.clone();
        if state.fail_checkout.contains(&current.remote) {
            return Err(HabitatError::SourceControlFailure(format!(
                "checkout of '{branch}' failed"
            )));
        }
        let target = match state.misplaced_checkout.get(&current.remote) {
            Some(hash) => hash.clone(),
            None => current.fetched.get(branch).cloned().ok_or_else(|| {
                HabitatError::SourceControlFailure(format!("unknown branch 'origin/{branch}'"))
            })?,
        };
        if let Some(copy) = state.copies.get_mut(&path) {
            copy.head = Some(target);
        }
        Ok(())
    }
}

fn copy<'s>(state: &'s State, path: &Path) -> Result<&'s WorkingCopy> {
    state
        .copies
        .get(path)
        .ok_or_else(|| HabitatError::NotAGitRepository(path.to_path_buf()))
}

impl SourceControl for FakeSourceControl {
    fn clone_repository<'a>(
        &'a self,
        remote: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<RepositoryHandle>> {
        let result = self.do_clone(remote, path);
        Box::pin(async move { result })
    }

    fn open_repository<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<RepositoryHandle>> {
        let result = self.do_open(path);
        Box::pin(async move { result })
    }

    fn fetch<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let result = self.do_fetch(repo, remote);
        Box::pin(async move { result })
    }

    fn branch_tip_commit<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Commit>> {
        let result = self.do_branch_tip(repo, branch);
        Box::pin(async move { result })
    }

    fn head_commit<'a>(&'a self, repo: &'a RepositoryHandle) -> BoxFuture<'a, Result<Commit>> {
        let result = self.do_head(repo);
        Box::pin(async move { result })
    }

    fn checkout<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        let result = self.do_checkout(repo, branch);
        Box::pin(async move { result })
    }
}
