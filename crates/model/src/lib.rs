//! VidSync Data Model
//!
//! Defines the data contracts passed between alignment stages:
//! - **Detection:** A marker reading and its recognizer confidence
//! - **Sync:** Sync points, trim boundaries, and alignment offsets
//! - **Events:** The structured, queryable per-frame event log
//! - **Report:** Summary of the quality-metric tool's JSON output
//!
//! Every value here is created and consumed within a single pipeline run.

pub mod detection;
pub mod event;
pub mod report;
pub mod sync;

pub use detection::*;
pub use event::*;
pub use report::*;
pub use sync::*;
