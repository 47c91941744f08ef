//! # quire-core
//!
//! Foundation pieces shared by the Quire crates.
//!
//! - **Logging**: [`logging::init_subscriber`] installs the process-wide
//!   `tracing` subscriber used by the CMS bootstrap.
//! - **Log capture**: [`logging::test_utils::capture_logs`] records events in
//!   memory so other crates can assert on what the hook core logged.

#![deny(unsafe_code)]

pub mod logging;
