//! Channel abstraction shared by all transports.

use async_trait::async_trait;
use futures::{StreamExt, future, stream::BoxStream};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::protocol::{Envelope, InboundEvent, OutboundEvent, ProtocolError};

/// Connection lifecycle of a channel.
///
/// `Disconnected -> Connecting -> Connected -> Closed`. Events are only
/// accepted while `Connected`; there is no outbound buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

/// Transport error.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Channel is not connected (state: {0:?})")]
    NotConnected(ConnectionState),
    #[error("Channel closed")]
    Closed,
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Connect failed: {0}")]
    Connect(String),
}

/// Inbound events for one namespace, in arrival order.
pub type InboundStream = BoxStream<'static, InboundEvent>;

/// Bidirectional, namespace-scoped event channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Namespace this channel is scoped to.
    fn namespace(&self) -> &str;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Send one logical event.
    ///
    /// Rejected with `NotConnected` unless the channel is connected.
    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError>;

    /// Take the inbound event stream.
    ///
    /// Returns `None` after the first call: a channel feeds exactly one sink.
    fn take_inbound(&self) -> Option<InboundStream>;
}

/// Shared, observable connection state.
#[derive(Debug)]
pub struct StateCell {
    sender: watch::Sender<ConnectionState>,
}

impl StateCell {
    #[must_use]
    pub fn new(initial: ConnectionState) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    #[must_use]
    pub fn get(&self) -> ConnectionState {
        *self.sender.borrow()
    }

    pub fn set(&self, state: ConnectionState) {
        let previous = self.sender.send_replace(state);
        if previous != state {
            tracing::debug!(?previous, ?state, "Channel state changed");
        }
    }

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.sender.subscribe()
    }

    /// Fail fast unless connected.
    ///
    /// # Errors
    /// Returns `NotConnected` with the current state.
    pub fn ensure_connected(&self) -> Result<(), TransportError> {
        match self.get() {
            ConnectionState::Connected => Ok(()),
            other => Err(TransportError::NotConnected(other)),
        }
    }
}

/// Decode raw envelopes into inbound events for `namespace`.
///
/// Envelopes addressed to other namespaces are never surfaced; malformed
/// ones are logged and skipped.
pub(crate) fn inbound_stream(
    namespace: String,
    rx: mpsc::UnboundedReceiver<Envelope>,
) -> InboundStream {
    UnboundedReceiverStream::new(rx)
        .filter_map(move |envelope| future::ready(route(&namespace, &envelope)))
        .boxed()
}

fn route(namespace: &str, envelope: &Envelope) -> Option<InboundEvent> {
    if envelope.ns != namespace {
        tracing::trace!(ns = %envelope.ns, event = %envelope.event, "Ignoring foreign namespace");
        return None;
    }
    match InboundEvent::from_envelope(envelope) {
        Ok(event) => Some(event),
        Err(ProtocolError::UnknownEvent(name)) => {
            tracing::warn!(ns = %namespace, event = %name, "Ignoring unknown inbound event");
            None
        }
        Err(e) => {
            tracing::error!(ns = %namespace, event = %envelope.event, "Invalid inbound event: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use serde_json::Value;

    use super::*;
    use crate::DEFAULT_NAMESPACE;

    #[tokio::test]
    async fn test_inbound_stream_filters_namespace() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = inbound_stream(DEFAULT_NAMESPACE.to_string(), rx);

        tx.send(Envelope::new("/chat", "started", Value::Null)).unwrap();
        tx.send(InboundEvent::Stream(Bytes::from_static(b"a")).to_envelope("/other"))
            .unwrap();
        tx.send(InboundEvent::Stream(Bytes::from_static(b"b")).to_envelope(DEFAULT_NAMESPACE))
            .unwrap();
        drop(tx);

        assert_eq!(
            stream.next().await,
            Some(InboundEvent::Stream(Bytes::from_static(b"b")))
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_inbound_stream_skips_malformed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = inbound_stream(DEFAULT_NAMESPACE.to_string(), rx);

        tx.send(Envelope::new(DEFAULT_NAMESPACE, "stream", Value::Bool(true)))
            .unwrap();
        tx.send(Envelope::new(DEFAULT_NAMESPACE, "mystery", Value::Null))
            .unwrap();
        tx.send(InboundEvent::Ended.to_envelope(DEFAULT_NAMESPACE)).unwrap();
        drop(tx);

        assert_eq!(stream.next().await, Some(InboundEvent::Ended));
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_state_cell_rejects_unless_connected() {
        let cell = StateCell::new(ConnectionState::Connecting);
        assert!(matches!(
            cell.ensure_connected(),
            Err(TransportError::NotConnected(ConnectionState::Connecting))
        ));

        cell.set(ConnectionState::Connected);
        assert!(cell.ensure_connected().is_ok());

        cell.set(ConnectionState::Closed);
        assert!(cell.ensure_connected().is_err());
    }
}
