//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SitelogSettings::default()`]
//! 2. If `~/.sitelog/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{sitelog_home, SitelogSettings, MAX_REMINDER_DELAY_SECS, MIN_REMINDER_DELAY_SECS};

/// Resolve the path to the settings file (`~/.sitelog/settings.json`).
pub fn settings_path() -> PathBuf {
    sitelog_home().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SitelogSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or out-of-range values, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<SitelogSettings> {
    let mut settings = load_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file(path: &Path) -> Result<SitelogSettings> {
    let defaults = serde_json::to_value(SitelogSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let settings: SitelogSettings = serde_json::from_value(merged)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &SitelogSettings) -> Result<()> {
    let delay = settings.reminders.delay_secs;
    if !(MIN_REMINDER_DELAY_SECS..=MAX_REMINDER_DELAY_SECS).contains(&delay) {
        return Err(SettingsError::out_of_range(
            "reminders.delaySecs",
            MIN_REMINDER_DELAY_SECS,
            MAX_REMINDER_DELAY_SECS,
            delay,
        ));
    }
    if settings.logging.level.trim().is_empty() {
        return Err(SettingsError::blank("logging.level"));
    }
    Ok(())
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SITELOG_*` environment variable overrides.
///
/// - Integers must be valid and within range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored (fall back to file/default)
pub fn apply_env_overrides(settings: &mut SitelogSettings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

fn apply_overrides_from(settings: &mut SitelogSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_string(&lookup, "SITELOG_DB_PATH") {
        settings.database.path = PathBuf::from(v);
    }
    if let Some(v) = read_u64(
        &lookup,
        "SITELOG_REMINDER_DELAY_SECS",
        MIN_REMINDER_DELAY_SECS,
        MAX_REMINDER_DELAY_SECS,
    ) {
        settings.reminders.delay_secs = v;
    }
    if let Some(v) = read_bool(&lookup, "SITELOG_REMINDERS_ENABLED") {
        settings.reminders.enabled = v;
    }
    if let Some(v) = read_string(&lookup, "SITELOG_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(&lookup, "SITELOG_LOG_JSON") {
        settings.logging.json = v;
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, min: u64, max: u64) -> Option<u64> {
    let raw = read_string(lookup, key)?;
    match raw.parse::<u64>() {
        Ok(v) if (min..=max).contains(&v) => Some(v),
        _ => {
            debug!(key, value = %raw, "ignoring invalid env override");
            None
        }
    }
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = read_string(lookup, key)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            debug!(key, value = %raw, "ignoring invalid env override");
            None
        }
    }
}
