//! # limiquantix Common
//!
//! Shared utilities for the limiquantix guest tooling.
//!
//! ## Logging
//!
//! ```rust
//! use limiquantix_common::init_logging;
//!
//! // RUST_LOG takes precedence over the level given here
//! init_logging("info").unwrap();
//! tracing::info!(name = "demo", "Guest defined");
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{init_logging, init_logging_json};
