//! Settings type definitions.
//!
//! All types use `camelCase` field names in JSON and `#[serde(default)]`, so
//! a partial settings file only needs the keys it changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Highest priority a hook callback may be registered at.
pub const MAX_HOOK_PRIORITY: i32 = 10_000;

/// Root settings type.
///
/// ```json
/// {
///   "logging": { "level": "quire_hooks=debug" },
///   "hooks": { "defaultPriority": 20, "singularSegments": { "widgets": "widget" } }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuireSettings {
    /// Settings schema version.
    pub version: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Hook registry configuration.
    pub hooks: HookSettings,
}

impl Default for QuireSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            logging: LoggingSettings::default(),
            hooks: HookSettings::default(),
        }
    }
}

impl QuireSettings {
    /// Check values that deserialization alone cannot constrain.
    pub fn validate(&self) -> Result<()> {
        self.hooks.validate()
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive, e.g. `"warn"` or `"quire_hooks=debug"`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

/// Hook registry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HookSettings {
    /// Priority used by callers that do not pick one.
    pub default_priority: i32,
    /// Hook names are truncated to this many characters before normalization.
    pub max_name_length: usize,
    /// Plural path segments rewritten to their singular form when they sit
    /// between two `/` separators.
    pub singular_segments: BTreeMap<String, String>,
}

impl Default for HookSettings {
    fn default() -> Self {
        let singular_segments = [
            ("plugins", "plugin"),
            ("themes", "theme"),
            ("pages", "page"),
            ("apps", "app"),
        ]
        .into_iter()
        .map(|(plural, singular)| (plural.to_string(), singular.to_string()))
        .collect();

        Self {
            default_priority: 10,
            max_name_length: 100,
            singular_segments,
        }
    }
}

impl HookSettings {
    /// Reject values the hook registry cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0..=MAX_HOOK_PRIORITY).contains(&self.default_priority) {
            return Err(SettingsError::InvalidValue(format!(
                "hooks.defaultPriority must be within 0..={MAX_HOOK_PRIORITY}, got {}",
                self.default_priority
            )));
        }
        if self.max_name_length == 0 {
            return Err(SettingsError::InvalidValue(
                "hooks.maxNameLength must be positive".to_string(),
            ));
        }
        for (plural, singular) in &self.singular_segments {
            if plural.is_empty() || singular.is_empty() {
                return Err(SettingsError::InvalidValue(format!(
                    "hooks.singularSegments entry '{plural}' -> '{singular}' has an empty side"
                )));
            }
        }
        Ok(())
    }
}
