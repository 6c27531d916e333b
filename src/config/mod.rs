// src/config/mod.rs

//! `Habitat.toml` loading and validation.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, RawConfigFile, SchedulerSettings};
pub use validate::{expand_home, parse_duration};
