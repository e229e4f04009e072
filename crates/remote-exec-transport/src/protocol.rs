//! Wire protocol for the code-execution namespace.
//!
//! Every frame is a JSON envelope `{ "ns", "event", "data" }`. Raw bytes
//! (keystrokes, terminal output) travel base64 encoded so control
//! sequences survive unchanged.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use remote_exec_core::{SessionIdentity, ViewportGeometry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Namespace used by the code-execution server endpoint.
pub const DEFAULT_NAMESPACE: &str = "/code-execution";

/// Protocol error.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown event: {0}")]
    UnknownEvent(String),
    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("Invalid base64 data: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// One namespaced event on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub ns: String,
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope.
    #[must_use]
    pub fn new(ns: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Self {
            ns: ns.into(),
            event: event.into(),
            data,
        }
    }

    /// Encode to a JSON text frame.
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    /// Returns error if the frame is not a valid envelope.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Event sent from the client to the execution server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundEvent {
    /// Associate this channel with the session.
    Join(SessionIdentity),
    /// Begin executing the process.
    Start(SessionIdentity),
    /// Resize the remote pseudo-terminal.
    Resize {
        identity: SessionIdentity,
        geometry: ViewportGeometry,
    },
    /// Raw keystroke bytes for the process.
    Input {
        identity: SessionIdentity,
        data: Bytes,
    },
    /// Terminate the process.
    Stop(SessionIdentity),
}

#[derive(Serialize, Deserialize)]
struct ResizePayload {
    #[serde(flatten)]
    identity: SessionIdentity,
    rows: u16,
    cols: u16,
}

#[derive(Serialize, Deserialize)]
struct InputPayload {
    #[serde(flatten)]
    identity: SessionIdentity,
    input: InputData,
}

/// Input as the server writes it to the terminal: the typed text itself, or
/// byte values when the input is not UTF-8.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum InputData {
    Text(String),
    Raw(Vec<u8>),
}

impl From<&Bytes> for InputData {
    fn from(data: &Bytes) -> Self {
        match std::str::from_utf8(data) {
            Ok(text) => Self::Text(text.to_owned()),
            Err(_) => Self::Raw(data.to_vec()),
        }
    }
}

impl From<InputData> for Bytes {
    fn from(input: InputData) -> Self {
        match input {
            InputData::Text(text) => Self::from(text),
            InputData::Raw(raw) => Self::from(raw),
        }
    }
}

impl OutboundEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Start(_) => "start",
            Self::Resize { .. } => "resize",
            Self::Input { .. } => "input",
            Self::Stop(_) => "stop",
        }
    }

    /// Identity pair carried by the event.
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        match self {
            Self::Join(identity)
            | Self::Start(identity)
            | Self::Stop(identity)
            | Self::Resize { identity, .. }
            | Self::Input { identity, .. } => identity,
        }
    }

    /// Wrap the event for the given namespace.
    ///
    /// # Errors
    /// Returns error if the payload cannot be serialized.
    pub fn to_envelope(&self, ns: &str) -> Result<Envelope, ProtocolError> {
        let data = match self {
            Self::Join(identity) | Self::Start(identity) | Self::Stop(identity) => {
                serde_json::to_value(identity)?
            }
            Self::Resize { identity, geometry } => serde_json::to_value(ResizePayload {
                identity: identity.clone(),
                rows: geometry.rows,
                cols: geometry.cols,
            })?,
            Self::Input { identity, data } => serde_json::to_value(InputPayload {
                identity: identity.clone(),
                input: InputData::from(data),
            })?,
        };
        Ok(Envelope::new(ns, self.name(), data))
    }

    /// Parse an outbound event (server side, or test peers).
    ///
    /// # Errors
    /// Returns error for unknown events or malformed payloads.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        let data = envelope.data.clone();
        let event = match envelope.event.as_str() {
            "join" => Self::Join(serde_json::from_value(data)?),
            "start" => Self::Start(serde_json::from_value(data)?),
            "stop" => Self::Stop(serde_json::from_value(data)?),
            "resize" => {
                let payload: ResizePayload = serde_json::from_value(data)?;
                Self::Resize {
                    identity: payload.identity,
                    geometry: ViewportGeometry::new(payload.rows, payload.cols),
                }
            }
            "input" => {
                let payload: InputPayload = serde_json::from_value(data)?;
                Self::Input {
                    identity: payload.identity,
                    data: Bytes::from(payload.input),
                }
            }
            other => return Err(ProtocolError::UnknownEvent(other.to_string())),
        };
        Ok(event)
    }
}

/// Event sent from the execution server to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// The remote process has begun; clear the screen.
    Started,
    /// One frame of terminal output.
    Stream(Bytes),
    /// The remote process has exited.
    Ended,
}

impl InboundEvent {
    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Stream(_) => "stream",
            Self::Ended => "ended",
        }
    }

    /// Wrap the event for the given namespace.
    #[must_use]
    pub fn to_envelope(&self, ns: &str) -> Envelope {
        let data = match self {
            Self::Stream(frame) => Value::String(BASE64.encode(frame)),
            Self::Started | Self::Ended => Value::Null,
        };
        Envelope::new(ns, self.name(), data)
    }

    /// Parse an inbound event.
    ///
    /// Stream frames are accepted either as a base64 string or as a JSON
    /// array of byte values.
    ///
    /// # Errors
    /// Returns error for unknown events or malformed frames.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        match envelope.event.as_str() {
            "started" => Ok(Self::Started),
            "ended" => Ok(Self::Ended),
            "stream" => {
                let frame = match &envelope.data {
                    Value::String(encoded) => BASE64.decode(encoded)?,
                    other => serde_json::from_value::<Vec<u8>>(other.clone())?,
                };
                Ok(Self::Stream(Bytes::from(frame)))
            }
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity::new("abc", "zzz")
    }

    #[test]
    fn test_join_envelope_shape() {
        let envelope = OutboundEvent::Join(identity())
            .to_envelope(DEFAULT_NAMESPACE)
            .unwrap();
        let json: Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "ns": "/code-execution",
                "event": "join",
                "data": { "id": "abc", "auth_code": "zzz" }
            })
        );
    }

    #[test]
    fn test_resize_payload_carries_identity_and_grid() {
        let event = OutboundEvent::Resize {
            identity: identity(),
            geometry: ViewportGeometry::new(30, 100),
        };
        let envelope = event.to_envelope(DEFAULT_NAMESPACE).unwrap();
        assert_eq!(
            envelope.data,
            json!({ "id": "abc", "auth_code": "zzz", "rows": 30, "cols": 100 })
        );
        assert_eq!(OutboundEvent::from_envelope(&envelope).unwrap(), event);
    }

    #[test]
    fn test_input_sent_as_typed_text() {
        let event = OutboundEvent::Input {
            identity: identity(),
            data: Bytes::from_static(b"ls\r\x1b[A\x03"),
        };
        let envelope = event.to_envelope(DEFAULT_NAMESPACE).unwrap();
        assert_eq!(
            envelope.data,
            json!({ "id": "abc", "auth_code": "zzz", "input": "ls\r\u{1b}[A\u{3}" })
        );
        assert_eq!(OutboundEvent::from_envelope(&envelope).unwrap(), event);
    }

    #[test]
    fn test_input_preserves_control_sequences() {
        let raw = Bytes::from_static(b"\x1b[A\x03\xff\x00q");
        let event = OutboundEvent::Input {
            identity: identity(),
            data: raw.clone(),
        };
        let envelope = event.to_envelope(DEFAULT_NAMESPACE).unwrap();
        assert_eq!(envelope.data["input"], json!([27, 91, 65, 3, 255, 0, 113]));

        let text = envelope.encode().unwrap();
        let parsed = OutboundEvent::from_envelope(&Envelope::decode(&text).unwrap()).unwrap();
        let OutboundEvent::Input { data, .. } = parsed else {
            panic!("Wrong event type");
        };
        assert_eq!(data, raw);
    }

    #[test]
    fn test_started_has_no_data() {
        let text = InboundEvent::Started
            .to_envelope(DEFAULT_NAMESPACE)
            .encode()
            .unwrap();
        assert!(!text.contains("data"));
        let envelope = Envelope::decode(&text).unwrap();
        assert_eq!(InboundEvent::from_envelope(&envelope).unwrap(), InboundEvent::Started);
    }

    #[test]
    fn test_stream_accepts_byte_array() {
        let envelope = Envelope::new(DEFAULT_NAMESPACE, "stream", json!([104, 105, 10]));
        assert_eq!(
            InboundEvent::from_envelope(&envelope).unwrap(),
            InboundEvent::Stream(Bytes::from_static(b"hi\n"))
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let envelope = Envelope::new(DEFAULT_NAMESPACE, "chat", Value::Null);
        assert!(matches!(
            InboundEvent::from_envelope(&envelope),
            Err(ProtocolError::UnknownEvent(name)) if name == "chat"
        ));
    }

    #[test]
    fn test_bad_base64_is_rejected() {
        let envelope = Envelope::new(DEFAULT_NAMESPACE, "stream", json!("not base64!"));
        assert!(matches!(
            InboundEvent::from_envelope(&envelope),
            Err(ProtocolError::Base64(_))
        ));
    }
}
