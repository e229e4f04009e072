//! Session lifecycle controller.
//!
//! Sequences creation -> join -> start for one remote process and is the
//! only way to affect it afterwards. Every outbound event carries the
//! identity pair recorded at creation, unchanged.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use remote_exec_core::{
    ContentApi, ProcessSpec, ReadinessError, Readiness, ReadyWaiter, SessionIdentity,
    TerminalWidget, ViewportGeometry,
};
use remote_exec_transport::{Channel, OutboundEvent, TransportError};
use tokio::{
    sync::{Mutex as AsyncMutex, mpsc, watch},
    task::JoinHandle,
};

use crate::{
    sink::{ProcessStatus, StreamSink},
    viewport::ViewportPolicy,
};

/// Lifecycle phase of a session.
///
/// `Pending -> Creating -> Created -> Joined -> Started -> Ended`, or
/// `Creating -> Failed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Pending,
    Creating,
    Created,
    Joined,
    Started,
    Ended,
    Failed,
}

/// Session error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Process creation failed: {0}")]
    CreationFailed(String),
    #[error("Cannot {operation} while session is {phase:?}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },
    #[error("Transport disconnected")]
    TransportDisconnected,
    #[error("Transport error: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotConnected(_) | TransportError::Closed => Self::TransportDisconnected,
            other => Self::Transport(other),
        }
    }
}

impl From<ReadinessError> for SessionError {
    fn from(e: ReadinessError) -> Self {
        match e {
            ReadinessError::Failed(reason) => Self::CreationFailed(reason),
            ReadinessError::Abandoned => Self::CreationFailed(ReadinessError::Abandoned.to_string()),
        }
    }
}

/// One remote process attachment.
///
/// The content API, channel and widget are injected; nothing is read
/// from ambient state.
pub struct ExecutionSession<A, C, W> {
    spec: ProcessSpec,
    api: A,
    channel: Arc<C>,
    widget: Arc<W>,
    readiness: Readiness,
    phase: Mutex<SessionPhase>,
    // Held from phase check through send; outbound order is call order
    outbound: AsyncMutex<()>,
    status: Arc<watch::Sender<ProcessStatus>>,
}

impl<A, C, W> ExecutionSession<A, C, W>
where
    A: ContentApi,
    C: Channel,
    W: TerminalWidget,
{
    /// Create a session object. Nothing is sent until [`Self::create`].
    #[must_use]
    pub fn new(spec: ProcessSpec, api: A, channel: Arc<C>, widget: Arc<W>) -> Self {
        let (status, _) = watch::channel(ProcessStatus::NotStarted);
        Self {
            spec,
            api,
            channel,
            widget,
            readiness: Readiness::new(),
            phase: Mutex::new(SessionPhase::Pending),
            outbound: AsyncMutex::new(()),
            status: Arc::new(status),
        }
    }

    #[must_use]
    pub const fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    #[must_use]
    pub const fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    #[must_use]
    pub const fn widget(&self) -> &Arc<W> {
        &self.widget
    }

    /// True once creation succeeded.
    #[must_use]
    pub fn ready_state(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Identity pair, once creation succeeded.
    #[must_use]
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.readiness.identity()
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        let ended = self.process_ended();
        effective_phase(*self.lock_phase(), ended)
    }

    /// Subscribe to the remote process status.
    #[must_use]
    pub fn process_status(&self) -> watch::Receiver<ProcessStatus> {
        self.status.subscribe()
    }

    /// Detached readiness waiter.
    #[must_use]
    pub fn readiness(&self) -> ReadyWaiter {
        self.readiness.subscribe()
    }

    /// Wait until creation resolves.
    ///
    /// # Errors
    /// Returns `CreationFailed` if creation failed.
    pub async fn wait_ready(&self) -> Result<SessionIdentity, SessionError> {
        Ok(self.readiness.wait().await?)
    }

    /// Handle exposing the action methods, only once the session is ready.
    #[must_use]
    pub fn ready(&self) -> Option<ReadySession<'_, A, C, W>> {
        self.identity()
            .map(|identity| ReadySession { session: self, identity })
    }

    /// Sink rendering inbound frames into this session's widget.
    #[must_use]
    pub fn sink(&self) -> StreamSink<W> {
        StreamSink::with_status(Arc::clone(&self.widget), Arc::clone(&self.status))
    }

    /// Ask the content API to create the process.
    ///
    /// Runs once per session object and never retries.
    ///
    /// # Errors
    /// Returns `CreationFailed` if the API rejects or fails the request,
    /// `InvalidState` if creation was already attempted.
    pub async fn create(&self) -> Result<SessionIdentity, SessionError> {
        self.advance("create", &[SessionPhase::Pending], SessionPhase::Creating)?;
        tracing::info!(executor = %self.spec.executor_kind, "Creating process");
        self.widget.writeln("Creating process").await;

        let outcome = match self.api.create_process(&self.spec).await {
            Ok(response) => response.into_identity(),
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(identity) => {
                self.set_phase(SessionPhase::Created);
                self.readiness.resolve(Ok(identity.clone()));
                tracing::info!(session_id = %identity.id(), "Process created");
                self.widget.writeln("Process created").await;
                Ok(identity)
            }
            Err(reason) => {
                self.set_phase(SessionPhase::Failed);
                self.readiness.resolve(Err(reason.clone()));
                tracing::warn!(%reason, "Process creation failed");
                self.widget.writeln("Failed to create process").await;
                Err(SessionError::CreationFailed(reason))
            }
        }
    }

    /// Associate the channel with the session.
    ///
    /// # Errors
    /// `InvalidState` unless the session is freshly created; transport
    /// errors if the event could not be sent.
    pub async fn join(&self) -> Result<(), SessionError> {
        self.transition("join", &[SessionPhase::Created], SessionPhase::Joined, OutboundEvent::Join)
            .await
    }

    /// Begin executing the process.
    ///
    /// # Errors
    /// `InvalidState` unless the session has joined; transport errors if
    /// the event could not be sent.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.transition("start", &[SessionPhase::Joined], SessionPhase::Started, OutboundEvent::Start)
            .await
    }

    /// Terminate the process.
    ///
    /// # Errors
    /// `InvalidState` unless joined or started; transport errors if the
    /// event could not be sent.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.transition(
            "stop",
            &[SessionPhase::Joined, SessionPhase::Started],
            SessionPhase::Ended,
            OutboundEvent::Stop,
        )
        .await
    }

    /// Resize the remote pseudo-terminal. Every call is sent.
    ///
    /// # Errors
    /// `InvalidState` before readiness; transport errors if the event
    /// could not be sent.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        let identity = self.require_identity("resize")?;
        let _outbound = self.outbound.lock().await;
        self.emit(OutboundEvent::Resize {
            identity,
            geometry: ViewportGeometry::new(rows, cols),
        })
        .await
    }

    /// Send raw keystroke bytes to the process, byte for byte.
    ///
    /// # Errors
    /// `InvalidState` before readiness; transport errors if the event
    /// could not be sent.
    pub async fn submit_input(&self, input: &[u8]) -> Result<(), SessionError> {
        let identity = self.require_identity("input")?;
        let _outbound = self.outbound.lock().await;
        self.emit(OutboundEvent::Input {
            identity,
            data: Bytes::copy_from_slice(input),
        })
        .await
    }

    async fn transition(
        &self,
        operation: &'static str,
        from: &[SessionPhase],
        to: SessionPhase,
        build: fn(SessionIdentity) -> OutboundEvent,
    ) -> Result<(), SessionError> {
        let identity = self.require_identity(operation)?;
        let _outbound = self.outbound.lock().await;
        self.check_phase(operation, from)?;

        // The phase only moves once the event has left
        self.emit(build(identity)).await?;
        self.set_phase(to);
        tracing::info!(phase = ?to, "Session {operation} sent");
        Ok(())
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), SessionError> {
        let name = event.name();
        tracing::debug!(session_id = %event.identity().id(), event = name, "Emitting");
        self.channel.emit(event).await.map_err(|e| {
            tracing::warn!(event = name, "Event not sent: {e}");
            SessionError::from(e)
        })
    }

    fn require_identity(&self, operation: &'static str) -> Result<SessionIdentity, SessionError> {
        self.identity().ok_or_else(|| SessionError::InvalidState {
            operation,
            phase: self.phase(),
        })
    }

    fn advance(
        &self,
        operation: &'static str,
        from: &[SessionPhase],
        to: SessionPhase,
    ) -> Result<(), SessionError> {
        let ended = self.process_ended();
        let mut phase = self.lock_phase();
        let current = effective_phase(*phase, ended);
        if !from.contains(&current) {
            return Err(SessionError::InvalidState {
                operation,
                phase: current,
            });
        }
        *phase = to;
        Ok(())
    }

    fn check_phase(&self, operation: &'static str, from: &[SessionPhase]) -> Result<(), SessionError> {
        match self.phase() {
            current if from.contains(&current) => Ok(()),
            current => Err(SessionError::InvalidState {
                operation,
                phase: current,
            }),
        }
    }

    fn set_phase(&self, next: SessionPhase) {
        *self.lock_phase() = next;
    }

    fn lock_phase(&self) -> MutexGuard<'_, SessionPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn process_ended(&self) -> bool {
        *self.status.borrow() == ProcessStatus::Ended
    }
}

impl<A, C, W> ExecutionSession<A, C, W>
where
    A: ContentApi + 'static,
    C: Channel + 'static,
    W: TerminalWidget + 'static,
{
    /// Wire the session to its widget and channel.
    ///
    /// Mounts the widget (if a container is given), forwards keystrokes to
    /// [`Self::submit_input`] in typing order, spawns the stream sink and
    /// sends the widget's geometry once the session is ready.
    ///
    /// # Errors
    /// Returns `InvalidState` if the channel's inbound stream was already taken.
    pub fn attach(
        self: &Arc<Self>,
        container: Option<W::Container>,
    ) -> Result<AttachHandle, SessionError> {
        let inbound = self
            .channel
            .take_inbound()
            .ok_or_else(|| SessionError::InvalidState {
                operation: "attach",
                phase: self.phase(),
            })?;

        if let Some(container) = container {
            self.widget.open(container);
        }

        let (key_tx, mut key_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.widget.on_keystroke(Box::new(move |data| {
            if key_tx.send(data).is_err() {
                tracing::trace!("Keystroke dropped: session detached");
            }
        }));

        let session = Arc::clone(self);
        let input = tokio::spawn(async move {
            while let Some(data) = key_rx.recv().await {
                if let Err(e) = session.submit_input(&data).await {
                    tracing::debug!("Keystroke dropped: {e}");
                }
            }
        });

        let sink = tokio::spawn(self.sink().run(inbound));

        let session = Arc::clone(self);
        let fit = tokio::spawn(async move {
            if session.wait_ready().await.is_ok() {
                if let Err(e) = ViewportPolicy::apply(session.as_ref()).await {
                    tracing::warn!("Initial resize failed: {e}");
                }
            }
        });

        Ok(AttachHandle {
            sink: Some(sink),
            background: vec![input, fit],
        })
    }
}

const fn effective_phase(phase: SessionPhase, process_ended: bool) -> SessionPhase {
    match phase {
        SessionPhase::Joined | SessionPhase::Started if process_ended => SessionPhase::Ended,
        other => other,
    }
}

/// Ready-only view of a session.
///
/// Only obtainable from [`ExecutionSession::ready`], so holding one means
/// the identity pair is set.
pub struct ReadySession<'a, A, C, W> {
    session: &'a ExecutionSession<A, C, W>,
    identity: SessionIdentity,
}

impl<A, C, W> ReadySession<'_, A, C, W>
where
    A: ContentApi,
    C: Channel,
    W: TerminalWidget,
{
    #[must_use]
    pub const fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// See [`ExecutionSession::join`].
    ///
    /// # Errors
    /// Phase or transport errors.
    pub async fn join(&self) -> Result<(), SessionError> {
        self.session.join().await
    }

    /// See [`ExecutionSession::start`].
    ///
    /// # Errors
    /// Phase or transport errors.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.session.start().await
    }

    /// See [`ExecutionSession::stop`].
    ///
    /// # Errors
    /// Phase or transport errors.
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.session.stop().await
    }

    /// See [`ExecutionSession::resize`].
    ///
    /// # Errors
    /// Transport errors.
    pub async fn resize(&self, rows: u16, cols: u16) -> Result<(), SessionError> {
        self.session.resize(rows, cols).await
    }

    /// See [`ExecutionSession::submit_input`].
    ///
    /// # Errors
    /// Transport errors.
    pub async fn submit_input(&self, input: &[u8]) -> Result<(), SessionError> {
        self.session.submit_input(input).await
    }
}

/// Background tasks started by [`ExecutionSession::attach`].
///
/// Dropping the handle stops them.
pub struct AttachHandle {
    sink: Option<JoinHandle<()>>,
    background: Vec<JoinHandle<()>>,
}

impl AttachHandle {
    /// Wait until the inbound stream closes.
    pub async fn stream_closed(&mut self) {
        if let Some(sink) = self.sink.take() {
            let _ = sink.await;
        }
    }
}

impl Drop for AttachHandle {
    fn drop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.abort();
        }
        for task in &self.background {
            task.abort();
        }
    }
}
