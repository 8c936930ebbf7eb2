//! hinter-core
//!
//! Core library for hinted standalone compilation of Python programs.
//!
//! This crate traces the imports a program performs, rebuilds the import call
//! hierarchy from the trace log, reduces it to a minimal accept-list, and
//! answers keep/drop questions for every module a standalone builder meets.
//!
//! All substantive logic lives here so it is fully testable without a Python
//! interpreter and reusable from multiple frontends.

pub mod model;
pub mod analysis;
pub mod store;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
