//! Shadercap Common Utilities
//!
//! Shared infrastructure for all Shadercap crates:
//! - Error types and result aliases
//! - Frame counts and retry schedules
//! - Tracing/logging initialization
//! - Configuration loading and debounced persistence

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
