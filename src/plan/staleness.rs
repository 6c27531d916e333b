// src/plan/staleness.rs

//! Does a plan need to be redeployed?

use std::fmt;

use tracing::debug;

use crate::errors::Result;
use crate::plan::locator::AssetLocator;
use crate::plan::model::{Commit, Head, Plan};
use crate::scm::{SourceControl, DEFAULT_REMOTE};

/// Why a plan is stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NeverCheckedOut,
    RemoteMoved { local: Commit, remote: Commit },
}

/// Outcome of a staleness check.
///
/// `CheckFailed` is kept distinct from `NotStale` so logs can tell
/// "confirmed up to date" from "could not tell", but neither triggers an
/// update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    Stale(StaleReason),
    NotStale,
    CheckFailed(String),
}

impl Staleness {
    pub fn needs_update(&self) -> bool {
        matches!(self, Staleness::Stale(_))
    }
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::Stale(StaleReason::NeverCheckedOut) => {
                f.write_str("stale (never checked out)")
            }
            Staleness::Stale(StaleReason::RemoteMoved { local, remote }) => {
                write!(f, "stale ({} -> {})", local.short(), remote.short())
            }
            Staleness::NotStale => f.write_str("up to date"),
            Staleness::CheckFailed(reason) => write!(f, "check failed: {reason}"),
        }
    }
}

/// Compare the plan's deployed commit against the remote branch tip.
///
/// A plan that was never checked out is stale without touching the network.
pub async fn check_staleness(
    plan: &Plan,
    locator: &AssetLocator,
    scm: &dyn SourceControl,
) -> Staleness {
    let local = match &plan.head {
        Head::NotYetCheckedOut => return Staleness::Stale(StaleReason::NeverCheckedOut),
        Head::Commit(c) => c.clone(),
    };

    match remote_tip(plan, locator, scm).await {
        Ok(remote) if remote == local => Staleness::NotStale,
        Ok(remote) => Staleness::Stale(StaleReason::RemoteMoved { local, remote }),
        Err(e) => Staleness::CheckFailed(e.to_string()),
    }
}

/// Boolean view of [`check_staleness`].
pub async fn needs_update(plan: &Plan, locator: &AssetLocator, scm: &dyn SourceControl) -> bool {
    check_staleness(plan, locator, scm).await.needs_update()
}

async fn remote_tip(plan: &Plan, locator: &AssetLocator, scm: &dyn SourceControl) -> Result<Commit> {
    let path = locator.working_copy(&plan.name);
    let repo = scm.open_repository(&path).await?;
    scm.fetch(&repo, DEFAULT_REMOTE).await?;
    let tip = scm
        .branch_tip_commit(&repo, &plan.repository.branch)
        .await?;
    debug!(plan = %plan.name, tip = %tip.short(), "fetched remote branch tip");
    Ok(tip)
}
