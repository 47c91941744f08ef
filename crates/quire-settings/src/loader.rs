//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`QuireSettings::default()`]
//! 2. If `~/.quire/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `QUIRE_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{MAX_HOOK_PRIORITY, QuireSettings};

/// Env var overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "QUIRE_LOG_LEVEL";
/// Env var overriding `hooks.defaultPriority`.
pub const ENV_HOOK_DEFAULT_PRIORITY: &str = "QUIRE_HOOK_DEFAULT_PRIORITY";
/// Env var overriding `hooks.maxNameLength`.
pub const ENV_HOOK_MAX_NAME_LENGTH: &str = "QUIRE_HOOK_MAX_NAME_LENGTH";

/// Resolve the path to the settings file (`~/.quire/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".quire").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<QuireSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or values that fail
/// validation are errors.
pub fn load_settings_from_path(path: &Path) -> Result<QuireSettings> {
    let mut settings = read_settings_file(path)?;
    apply_overrides(&mut settings, |key| std::env::var(key).ok());
    settings.validate()?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<QuireSettings> {
    let defaults = serde_json::to_value(QuireSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply overrides read through `lookup` (the process environment in
/// production).
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept.
pub fn apply_overrides(settings: &mut QuireSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup(ENV_LOG_LEVEL).filter(|v| !v.is_empty()) {
        settings.logging.level = v;
    }
    if let Some(v) = read_ranged(&lookup, ENV_HOOK_DEFAULT_PRIORITY, 0, i64::from(MAX_HOOK_PRIORITY))
        .and_then(|v| i32::try_from(v).ok())
    {
        settings.hooks.default_priority = v;
    }
    if let Some(v) = read_ranged(&lookup, ENV_HOOK_MAX_NAME_LENGTH, 1, 1000)
        .and_then(|v| usize::try_from(v).ok())
    {
        settings.hooks.max_name_length = v;
    }
}

/// Parse a string as an `i64` within an inclusive range.
pub fn parse_i64_range(val: &str, min: i64, max: i64) -> Option<i64> {
    let n: i64 = val.trim().parse().ok()?;
    (min..=max).contains(&n).then_some(n)
}

fn read_ranged(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    min: i64,
    max: i64,
) -> Option<i64> {
    let val = lookup(name)?;
    let result = parse_i64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid integer env var, ignoring");
    }
    result
}
