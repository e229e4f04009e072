//! In-process channel pair.
//!
//! `MemoryChannel` is the client side; `MemoryPeer` plays the server: it
//! observes every emitted envelope and injects inbound ones. Useful for
//! embedding and for tests.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    channel::{Channel, ConnectionState, InboundStream, StateCell, TransportError, inbound_stream},
    protocol::{Envelope, InboundEvent, OutboundEvent, ProtocolError},
};

/// Client side of an in-process channel.
pub struct MemoryChannel {
    namespace: String,
    state: Arc<StateCell>,
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
}

impl MemoryChannel {
    /// Create a connected channel and its peer.
    #[must_use]
    pub fn pair(namespace: impl Into<String>) -> (Self, MemoryPeer) {
        let namespace = namespace.into();
        let state = Arc::new(StateCell::new(ConnectionState::Connected));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let channel = Self {
            namespace: namespace.clone(),
            state: Arc::clone(&state),
            outbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
        };

        let peer = MemoryPeer {
            namespace,
            state,
            outbound_rx,
            inbound_tx,
        };

        (channel, peer)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        self.state.ensure_connected()?;
        let envelope = event.to_envelope(&self.namespace)?;
        self.outbound_tx
            .send(envelope)
            .map_err(|_| TransportError::Closed)
    }

    fn take_inbound(&self) -> Option<InboundStream> {
        let rx = self
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        Some(inbound_stream(self.namespace.clone(), rx))
    }
}

/// Server side of an in-process channel.
pub struct MemoryPeer {
    namespace: String,
    state: Arc<StateCell>,
    outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    inbound_tx: mpsc::UnboundedSender<Envelope>,
}

impl MemoryPeer {
    /// Send an inbound event in the channel's namespace.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn send(&self, event: &InboundEvent) -> Result<(), TransportError> {
        self.send_envelope(event.to_envelope(&self.namespace))
    }

    /// Send a raw envelope, whatever its namespace.
    ///
    /// # Errors
    /// Returns error if the client side is gone.
    pub fn send_envelope(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.inbound_tx
            .send(envelope)
            .map_err(|_| TransportError::Closed)
    }

    /// Receive the next emitted envelope.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.outbound_rx.recv().await
    }

    /// Receive the next emitted envelope (non-blocking).
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.outbound_rx.try_recv().ok()
    }

    /// Decode every envelope emitted so far.
    ///
    /// # Errors
    /// Returns error if an emitted envelope is malformed.
    pub fn drain_events(&mut self) -> Result<Vec<OutboundEvent>, ProtocolError> {
        let mut events = Vec::new();
        while let Some(envelope) = self.try_recv() {
            events.push(OutboundEvent::from_envelope(&envelope)?);
        }
        Ok(events)
    }

    /// Simulate a dropped connection.
    pub fn disconnect(&self) {
        self.state.set(ConnectionState::Disconnected);
    }

    /// Simulate reconnecting.
    pub fn reconnect(&self) {
        self.state.set(ConnectionState::Connected);
    }

    /// Close the connection for good.
    pub fn close(&self) {
        self.state.set(ConnectionState::Closed);
    }
}
