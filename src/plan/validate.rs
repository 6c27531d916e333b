// src/plan/validate.rs

//! Boundary validation for plan fields.
//!
//! Everything that enters the plan collection passes through here, whether
//! it comes from the config file or from the management handle.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::errors::{HabitatError, Result};
use crate::plan::model::Plan;

/// Plan names double as directory names under the asset root.
static PLAN_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("static regex"));

/// `user@host:path/to/repo.git`
static SCP_REMOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9.-]+:[A-Za-z0-9._~/-]+$").expect("static regex")
});

static ENV_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

pub fn validate_plan(plan: &Plan) -> Result<()> {
    validate_plan_name(&plan.name)?;
    validate_remote(&plan.repository.url)
        .map_err(|e| HabitatError::InvalidPlan(format!("plan '{}': {e}", plan.name)))?;
    validate_branch(&plan.repository.branch)
        .map_err(|e| HabitatError::InvalidPlan(format!("plan '{}': {e}", plan.name)))?;
    for key in plan.environment.keys() {
        validate_env_key(key)
            .map_err(|e| HabitatError::InvalidPlan(format!("plan '{}': {e}", plan.name)))?;
    }
    Ok(())
}

pub fn validate_plan_name(name: &str) -> Result<()> {
    if PLAN_NAME.is_match(name) {
        Ok(())
    } else {
        Err(HabitatError::InvalidPlan(format!(
            "plan name '{name}' must start with a letter or digit and contain only letters, digits, '.', '_' or '-'"
        )))
    }
}

/// Accepts URLs with a host or `file://` URLs, scp-style remotes and
/// absolute local paths.
pub fn validate_remote(remote: &str) -> Result<()> {
    let remote = remote.trim();
    if remote.is_empty() {
        return Err(HabitatError::InvalidPlan(
            "repository URL is empty".to_string(),
        ));
    }
    if remote.chars().any(char::is_whitespace) {
        return Err(HabitatError::InvalidPlan(format!(
            "repository URL '{remote}' contains whitespace"
        )));
    }
    if SCP_REMOTE.is_match(remote) || Path::new(remote).is_absolute() {
        return Ok(());
    }
    match Url::parse(remote) {
        Ok(url) if url.scheme() == "file" || url.has_host() => Ok(()),
        Ok(url) => Err(HabitatError::InvalidPlan(format!(
            "repository URL '{remote}' has no host (scheme '{}')",
            url.scheme()
        ))),
        Err(e) => Err(HabitatError::InvalidPlan(format!(
            "malformed repository URL '{remote}': {e}"
        ))),
    }
}

fn validate_branch(branch: &str) -> Result<()> {
    if branch.is_empty()
        || branch.starts_with('-')
        || branch.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(HabitatError::InvalidPlan(format!(
            "invalid branch name '{branch}'"
        )));
    }
    Ok(())
}

/// Scripts must be local: a plain path or a `file://` URL.
pub fn validate_script_location(location: &str) -> Result<()> {
    if location.trim().is_empty() {
        return Err(HabitatError::InvalidPlan(
            "script location is empty".to_string(),
        ));
    }
    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => Ok(()),
        // Single-letter schemes are Windows drive letters, not URLs.
        Ok(url) if url.scheme().len() > 1 => Err(HabitatError::InvalidPlan(format!(
            "script '{location}' must be a local path or file:// URL"
        ))),
        _ => Ok(()),
    }
}

pub fn validate_env_key(key: &str) -> Result<()> {
    if ENV_KEY.is_match(key) {
        Ok(())
    } else {
        Err(HabitatError::InvalidPlan(format!(
            "invalid environment variable name '{key}'"
        )))
    }
}
