//! Session lifecycle and stream rendering for remote code execution.
//!
//! Provides:
//! - `ExecutionSession` - Create, join, start and drive a remote process
//! - `StreamSink` - Render inbound output frames in order
//! - `ViewportPolicy` - Turn widget geometry into resize events
//! - `HttpContentApi` - Process creation over HTTP (feature: http)
//! - `ClientConfig` - TOML + environment configuration

pub mod config;
pub mod controller;
pub mod sink;
pub mod viewport;

#[cfg(feature = "http")]
pub mod http_api;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError, api_root_for_host};
pub use controller::{AttachHandle, ExecutionSession, ReadySession, SessionError, SessionPhase};
pub use sink::{ProcessStatus, StreamSink};
pub use viewport::ViewportPolicy;

#[cfg(feature = "http")]
pub use http_api::HttpContentApi;
