//! Structured logging with `tracing`.
//!
//! Every Quire crate logs through the `tracing` macros with structured
//! fields (`debug!(hook = %name, priority, "...")`). The binary hosting the
//! CMS calls [`init_subscriber`] once at startup; libraries never install a
//! subscriber themselves.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Default filter directive when neither settings nor `RUST_LOG` say otherwise.
pub const DEFAULT_LEVEL: &str = "warn";

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
///
/// # Arguments
///
/// * `level` - Filter directive, e.g. `"warn"` or `"quire_hooks=debug"`.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    // try_init fails if a global subscriber is already set
    let _ = subscriber.try_init();
}
