// src/config/validate.rs

use anyhow::Result;

use crate::config::model::Settings;
use crate::errors::RouterError;

pub fn validate_settings(settings: &Settings) -> Result<()> {
    ensure_watch_directory(settings)?;
    validate_timeout(settings)?;
    ensure_has_mappings(settings)?;
    validate_mappings(settings)?;
    validate_default_worker(settings)?;
    Ok(())
}

fn ensure_watch_directory(settings: &Settings) -> Result<()> {
    if settings.watch_directory.as_os_str().is_empty() {
        return Err(RouterError::ConfigError(
            "WatchDirectory must not be empty".to_string(),
        )
        .into());
    }
    Ok(())
}

fn validate_timeout(settings: &Settings) -> Result<()> {
    if settings.timeout_seconds == 0 {
        return Err(RouterError::ConfigError(
            "TimeoutSeconds must be >= 1 (got 0)".to_string(),
        )
        .into());
    }
    Ok(())
}

fn ensure_has_mappings(settings: &Settings) -> Result<()> {
    if settings.mappings.is_empty() {
        return Err(RouterError::ConfigError(
            "Mappings must contain at least one worker entry".to_string(),
        )
        .into());
    }
    Ok(())
}

fn validate_mappings(settings: &Settings) -> Result<()> {
    for (key, mapping) in settings.mappings.iter() {
        if mapping.executable_path.trim().is_empty() {
            return Err(RouterError::ConfigError(format!(
                "mapping '{}' has an empty ExecutablePath",
                key
            ))
            .into());
        }
        if mapping.output_directory.as_os_str().is_empty() {
            return Err(RouterError::ConfigError(format!(
                "mapping '{}' has an empty OutputDirectory",
                key
            ))
            .into());
        }
    }
    Ok(())
}

fn validate_default_worker(settings: &Settings) -> Result<()> {
    if let Some(default) = settings.default_worker_for_root.as_deref() {
        if !settings.mappings.contains_key(default) {
            return Err(RouterError::ConfigError(format!(
                "DefaultWorkerForRoot '{}' has no entry in Mappings",
                default
            ))
            .into());
        }
    }
    Ok(())
}
