//! # quire-settings
//!
//! Configuration for the Quire CMS core, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`QuireSettings::default()`]
//! 2. **User file**: `~/.quire/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `QUIRE_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use quire_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("default hook priority: {}", settings.hooks.default_priority);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<QuireSettings> = OnceLock::new();

/// Get the process-wide settings.
///
/// The first call loads `~/.quire/settings.json` with env overrides and
/// falls back to compiled defaults if loading or validation fails.
pub fn get_settings() -> &'static QuireSettings {
    SETTINGS.get_or_init(|| match load_settings() {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!(error = %err, "failed to load settings, using defaults");
            QuireSettings::default()
        }
    })
}

/// Initialize the process-wide settings with a specific value.
///
/// Returns the value back if settings were already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: QuireSettings) -> std::result::Result<(), QuireSettings> {
    SETTINGS.set(settings)
}
