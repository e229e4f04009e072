//! WebSocket channel for the code-execution namespace.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    channel::{Channel, ConnectionState, InboundStream, StateCell, TransportError, inbound_stream},
    protocol::{Envelope, OutboundEvent},
};

/// Client-side WebSocket channel.
///
/// One connection, one namespace. Outbound envelopes go through a single
/// writer task so they hit the socket in emit order.
pub struct WsChannel {
    namespace: String,
    state: Arc<StateCell>,
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl WsChannel {
    /// Connect to `url` and scope the channel to `namespace`.
    ///
    /// # Errors
    /// Returns error if the WebSocket handshake fails.
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self, TransportError> {
        let namespace = namespace.into();
        let state = Arc::new(StateCell::new(ConnectionState::Disconnected));

        state.set(ConnectionState::Connecting);
        tracing::info!(%url, ns = %namespace, "Connecting");

        let (ws_stream, _) = match tokio_tungstenite::connect_async(url).await {
            Ok(connected) => connected,
            Err(e) => {
                state.set(ConnectionState::Disconnected);
                return Err(TransportError::Connect(e.to_string()));
            }
        };
        state.set(ConnectionState::Connected);
        tracing::info!(%url, ns = %namespace, "Connected");

        let (mut ws_sink, mut ws_source) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

        // Forward emitted envelopes to the socket
        let writer_state = Arc::clone(&state);
        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                    tracing::warn!("WebSocket write failed: {e}");
                    writer_state.set(ConnectionState::Disconnected);
                    break;
                }
            }
        });

        // Read frames until the server goes away
        let reader_state = Arc::clone(&state);
        let reader = tokio::spawn(async move {
            let mut closed_cleanly = false;
            while let Some(msg) = ws_source.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text.as_str().to_owned(),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => continue,
                    },
                    Ok(Message::Close(_)) => {
                        closed_cleanly = true;
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::error!("WebSocket error: {e}");
                        break;
                    }
                };

                match Envelope::decode(&text) {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Invalid envelope: {e}"),
                }
            }

            let next = if closed_cleanly {
                ConnectionState::Closed
            } else {
                ConnectionState::Disconnected
            };
            reader_state.set(next);
            tracing::info!(state = ?next, "WebSocket reader finished");
        });

        Ok(Self {
            namespace,
            state,
            outbound_tx,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            tasks: vec![writer, reader],
        })
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_changes(&self) -> tokio::sync::watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

#[async_trait]
impl Channel for WsChannel {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        self.state.ensure_connected()?;
        let text = event.to_envelope(&self.namespace)?.encode()?;
        tracing::trace!(ns = %self.namespace, event = event.name(), "Emitting");
        self.outbound_tx
            .send(text)
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

impl Drop for WsChannel {
    fn drop(&mut self) {
        self.state.set(ConnectionState::Closed);
        for task in &self.tasks {
            task.abort();
        }
    }
}
