//! Core types and seams for remote code-execution sessions.
//!
//! This crate provides the fundamental building blocks:
//! - `ProcessSpec` / `SessionIdentity` - What to run and who may drive it
//! - `Readiness` - Single-resolution, result-bearing creation signal
//! - `ViewportGeometry` - Terminal grid sizing
//! - `ContentApi` and `TerminalWidget` traits

pub mod geometry;
pub mod identity;
pub mod readiness;
pub mod traits;

pub use geometry::{CellMetrics, ViewportGeometry};
pub use identity::{CreateProcessResponse, ProcessSpec, SessionIdentity};
pub use readiness::{ReadinessError, ReadyState, ReadyWaiter, Readiness};
pub use traits::{ContentApi, ContentApiError, KeystrokeHandler, TerminalWidget};
