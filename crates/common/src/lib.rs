//! VidSync Common Utilities
//!
//! Shared infrastructure for all VidSync crates:
//! - Error types and result aliases
//! - Frame timebase conversions (frame index <-> seconds)
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
