// src/config/validate.rs

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::{
    AssetsSection, ConfigFile, PlanSection, RawConfigFile, SchedulerSection, SchedulerSettings,
};
use crate::errors::{HabitatError, Result};
use crate::plan::Plan;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = HabitatError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let scheduler = validate_scheduler(&raw.scheduler)?;
        let assets_root = resolve_assets_root(&raw.assets)?;
        let plans = raw
            .plan
            .into_iter()
            .map(|(name, section)| plan_from_section(name, section))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConfigFile::new_unchecked(scheduler, assets_root, plans))
    }
}

fn validate_scheduler(section: &SchedulerSection) -> Result<SchedulerSettings> {
    let interval = duration_field("interval", &section.interval)?;
    if interval.is_zero() {
        return Err(HabitatError::ConfigError(
            "[scheduler].interval must be greater than zero".to_string(),
        ));
    }

    if section.workers == 0 {
        return Err(HabitatError::ConfigError(
            "[scheduler].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(SchedulerSettings {
        interval,
        initial_delay: duration_field("initial_delay", &section.initial_delay)?,
        tolerance: duration_field("tolerance", &section.tolerance)?,
        workers: section.workers,
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| HabitatError::ConfigError(format!("[scheduler].{field}: {e}")))
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;

    match unit_part.trim().to_lowercase().as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        unit => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

fn resolve_assets_root(section: &AssetsSection) -> Result<PathBuf> {
    let root = section.root.trim();
    if root.is_empty() {
        return Err(HabitatError::ConfigError(
            "[assets].root must not be empty".to_string(),
        ));
    }
    expand_home(root)
}

/// Expand a leading `~` or `~/` using the current user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    let rest = match path.strip_prefix('~') {
        None => return Ok(PathBuf::from(path)),
        Some(rest) if rest.is_empty() => "",
        Some(rest) => match rest.strip_prefix('/') {
            Some(rest) => rest,
            // `~user/...` is not supported.
            None => return Ok(PathBuf::from(path)),
        },
    };

    let home = dirs::home_dir().ok_or_else(|| {
        HabitatError::ConfigError(format!("cannot expand '{path}': no home directory"))
    })?;
    Ok(if rest.is_empty() { home } else { home.join(rest) })
}

fn plan_from_section(name: String, section: PlanSection) -> Result<Plan> {
    let mut builder = Plan::builder().name(name).environment(section.environment);
    if let Some(url) = section.repository {
        builder = builder.repository(url);
    }
    if let Some(branch) = section.branch {
        builder = builder.branch(branch);
    }
    if let Some(build) = section.build {
        builder = builder.build_script(build);
    }
    if let Some(launch) = section.launch {
        builder = builder.launch_script(launch);
    }
    builder.build()
}
