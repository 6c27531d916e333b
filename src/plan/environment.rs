// src/plan/environment.rs

//! `KEY=VALUE` text form of a plan's environment, as entered in a
//! management form and shown in detail views.

use std::collections::BTreeMap;

use crate::errors::{HabitatError, Result};
use crate::plan::validate::validate_env_key;

/// Parse one `KEY=VALUE` pair per line.
///
/// - blank lines are skipped
/// - the value is everything after the first `=` (it may contain `=`)
/// - lines without `=`, invalid keys and duplicate keys are rejected
pub fn parse_environment(text: &str) -> Result<BTreeMap<String, String>> {
    let mut environment = BTreeMap::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            HabitatError::InvalidPlan(format!(
                "environment line {} has no '=': {line:?}",
                idx + 1
            ))
        })?;
        let key = key.trim();
        validate_env_key(key)?;

        if environment
            .insert(key.to_string(), value.to_string())
            .is_some()
        {
            return Err(HabitatError::InvalidPlan(format!(
                "environment variable '{key}' is defined more than once"
            )));
        }
    }

    Ok(environment)
}

/// Inverse of [`parse_environment`] for well-formed maps.
pub fn format_environment(environment: &BTreeMap<String, String>) -> String {
    environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
}
