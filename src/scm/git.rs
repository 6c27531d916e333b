// src/scm/git.rs

//! [`SourceControl`] backed by the `git` command-line client.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::{HabitatError, Result};
use crate::plan::Commit;
use crate::scm::{RepositoryHandle, SourceControl, DEFAULT_REMOTE};
use crate::types::BoxFuture;

/// Drives a `git` executable found on `PATH` (or at an explicit location).
#[derive(Debug, Clone)]
pub struct GitCli {
    program: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run git with `args`, returning trimmed stdout.
    ///
    /// Non-zero exits become `SourceControlFailure` carrying stderr.
    async fn run(&self, cwd: Option<&Path>, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        debug!(?args, cwd = ?cwd, "running git");

        let out = cmd.output().await.map_err(|e| {
            HabitatError::SourceControlFailure(format!(
                "failed to start {:?} {:?}: {e}",
                self.program, args
            ))
        })?;

        if !out.status.success() {
            return Err(HabitatError::SourceControlFailure(format!(
                "git {:?} exited with {}: {}",
                args,
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }

    /// Make `origin` in `repo` refer to `remote`, adding it when missing.
    async fn point_origin_at(&self, repo: &RepositoryHandle, remote: &str) -> Result<()> {
        let cwd = Some(repo.path());
        match self.run(cwd, &["remote", "get-url", DEFAULT_REMOTE]).await {
            Ok(current) if current == remote => Ok(()),
            Ok(current) => {
                debug!(%current, %remote, "re-pointing origin");
                self.run(cwd, &["remote", "set-url", DEFAULT_REMOTE, remote])
                    .await
                    .map(|_| ())
            }
            Err(_) => self
                .run(cwd, &["remote", "add", DEFAULT_REMOTE, remote])
                .await
                .map(|_| ()),
        }
    }

    async fn rev_parse(&self, repo: &RepositoryHandle, rev: &str) -> Result<Commit> {
        let spec = format!("{rev}^{{commit}}");
        let hash = self
            .run(Some(repo.path()), &["rev-parse", "--verify", "--quiet", &spec])
            .await?;
        Ok(Commit::new(hash))
    }
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        HabitatError::SourceControlFailure(format!("path {path:?} is not valid UTF-8"))
    })
}

impl SourceControl for GitCli {
    fn clone_repository<'a>(
        &'a self,
        remote: &'a str,
        path: &'a Path,
    ) -> BoxFuture<'a, Result<RepositoryHandle>> {
        Box::pin(async move {
            // A working copy left by an earlier run (or an earlier remote for
            // the same plan) is re-pointed and refreshed instead of cloned over.
            if let Ok(repo) = self.open_repository(path).await {
                self.point_origin_at(&repo, remote).await?;
                self.fetch(&repo, DEFAULT_REMOTE).await?;
                info!(path = %path.display(), %remote, "reusing existing working copy");
                return Ok(repo);
            }

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.run(
                None,
                &["clone", "--origin", DEFAULT_REMOTE, remote, path_arg(path)?],
            )
            .await?;
            Ok(RepositoryHandle::new(path))
        })
    }

    fn open_repository<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<RepositoryHandle>> {
        Box::pin(async move {
            if !path.is_dir() {
                return Err(HabitatError::NotAGitRepository(path.to_path_buf()));
            }
            let top = self
                .run(Some(path), &["rev-parse", "--show-toplevel"])
                .await
                .map_err(|_| HabitatError::NotAGitRepository(path.to_path_buf()))?;

            // A directory nested inside some other checkout is not ours.
            let same = match (Path::new(&top).canonicalize(), path.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            };
            if !same {
                return Err(HabitatError::NotAGitRepository(path.to_path_buf()));
            }
            Ok(RepositoryHandle::new(path))
        })
    }

    fn fetch<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        remote: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.run(Some(repo.path()), &["fetch", "--prune", remote])
                .await
                .map(|_| ())
        })
    }

    fn branch_tip_commit<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<Commit>> {
        Box::pin(async move {
            let remote_ref = format!("refs/remotes/{DEFAULT_REMOTE}/{branch}");
            self.rev_parse(repo, &remote_ref).await
        })
    }

    fn head_commit<'a>(&'a self, repo: &'a RepositoryHandle) -> BoxFuture<'a, Result<Commit>> {
        Box::pin(async move {
            self.rev_parse(repo, "HEAD")
                .await
                .map_err(|_| HabitatError::NotAGitRepository(repo.path().to_path_buf()))
        })
    }

    fn checkout<'a>(
        &'a self,
        repo: &'a RepositoryHandle,
        branch: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            // Reset the local branch onto the remote tip; local commits in a
            // deployment working copy are not preserved.
            let start = format!("{DEFAULT_REMOTE}/{branch}");
            self.run(
                Some(repo.path()),
                &["checkout", "--force", "-B", branch, &start],
            )
            .await
            .map(|_| ())
        })
    }
}
