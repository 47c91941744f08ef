//! # quire-hooks
//!
//! Action and filter hooks for the Quire CMS core.
//!
//! Plugins and themes register callbacks against hook names; the core
//! dispatches those names at fixed points during a request.
//!
//! - **Actions** ([`HookRegistry::do_action`]) run callbacks for their side
//!   effects.
//! - **Filters** ([`HookRegistry::apply_filter`]) thread a value through
//!   callbacks, each returning the replacement.
//!
//! ## Names
//!
//! Every name goes through [`canonicalize`] before use, so `App.Init`,
//! `app init` and `app/init` are the same hook.
//!
//! ## Ordering
//!
//! Callbacks run by ascending priority (`0..=10000`), then by registration
//! order. Re-registering the same callback at the same priority is a no-op.
//!
//! ## Errors
//!
//! Registration validates names, priority and callback up front and
//! writes nothing on failure. Errors returned by callbacks stop the
//! dispatch and propagate to the caller.
//!
//! ## Example
//!
//! ```rust
//! use quire_hooks::{Callback, HookCall, HookRegistry, HookResult};
//! use serde_json::{Value, json};
//!
//! fn shout(call: HookCall<'_>) -> HookResult<Value> {
//!     Ok(Value::String(call.value.as_str().unwrap_or_default().to_uppercase()))
//! }
//!
//! let registry = HookRegistry::new();
//! registry.define_function("shout", shout);
//! registry.add_filter("page.title", Callback::function("shout"), 10)?;
//! let title = registry.apply_filter("page.title", json!("home"), &json!({}))?;
//! assert_eq!(title, json!("HOME"));
//! # Ok::<(), quire_hooks::HookError>(())
//! ```

#![deny(unsafe_code)]

pub mod callback;
pub mod dispatch;
pub mod errors;
pub mod name;
mod output;
pub mod registry;
pub mod state;

pub use callback::{Callback, CallbackId, ClosureFn, HookCall, HookFn, HookTarget, Sentinel};
pub use errors::{HookError, HookResult};
pub use name::{HookName, HookNames, NameCanonicalizer, canonicalize};
pub use registry::{DEFAULT_PRIORITY, HookKind, HookRegistry, MAX_PRIORITY};
pub use state::HookState;

use quire_settings::QuireSettings;
use tracing::info;

/// Install the log subscriber and build a registry from `settings`.
///
/// Called once at startup; the returned registry is the one the rest of
/// the application shares.
#[must_use]
pub fn bootstrap(settings: &QuireSettings) -> HookRegistry {
    quire_core::logging::init_subscriber(&settings.logging.level);
    let registry = HookRegistry::from_settings(&settings.hooks);
    info!(
        default_priority = registry.default_priority(),
        max_name_length = settings.hooks.max_name_length,
        "hook registry ready"
    );
    registry
}
