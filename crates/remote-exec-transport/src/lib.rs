//! Namespaced event channel for remote code-execution sessions.
//!
//! Provides:
//! - Wire protocol (JSON envelopes, typed input, base64 output frames)
//! - `Channel` trait with an explicit connection state
//! - In-memory channel pair
//! - WebSocket channel (feature: websocket)
//! - Crossterm keystroke encoding (feature: tui)

pub mod channel;
pub mod memory;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use channel::{Channel, ConnectionState, InboundStream, TransportError};
pub use memory::{MemoryChannel, MemoryPeer};
pub use protocol::{DEFAULT_NAMESPACE, Envelope, InboundEvent, OutboundEvent, ProtocolError};

#[cfg(feature = "websocket")]
pub use websocket::WsChannel;
