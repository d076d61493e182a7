// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::model::Settings;
use crate::config::validate::validate_settings;
use crate::paths;

/// Load a configuration file from a given path and return the raw
/// `Settings`.
///
/// This only performs JSON deserialization; it does **not** perform
/// semantic validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading config file at {:?}", path))?;

    let settings: Settings = serde_json::from_str(&contents)
        .with_context(|| format!("parsing JSON config from {:?}", path))?;

    Ok(settings)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Settings> {
    let settings = load_from_path(&path)?;
    validate_settings(&settings)?;
    Ok(settings)
}

/// Resolve the effective config path: an explicit `--config` value, or
/// `config.json` in the discovered solution root.
pub fn effective_config_path(cli_config: Option<&str>) -> PathBuf {
    match cli_config {
        Some(p) => PathBuf::from(p),
        None => paths::discover_solution_root().join("config.json"),
    }
}
