//! Fakes shared by the unit tests.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use remote_exec_core::{
    ContentApi, ContentApiError, CreateProcessResponse, KeystrokeHandler, ProcessSpec,
    SessionIdentity, TerminalWidget, ViewportGeometry,
};
use remote_exec_transport::{
    Channel, ConnectionState, InboundStream, MemoryChannel, OutboundEvent, TransportError,
};
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetOp {
    Open(String),
    Clear,
    Write(Vec<u8>),
}

/// Widget that records every call, optionally slowing down writes.
pub struct RecordingWidget {
    ops: Mutex<Vec<WidgetOp>>,
    geometry: Mutex<ViewportGeometry>,
    handler: Mutex<Option<KeystrokeHandler>>,
    write_delays: Mutex<VecDeque<Duration>>,
}

impl RecordingWidget {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(Vec::new()),
            geometry: Mutex::new(ViewportGeometry::default()),
            handler: Mutex::new(None),
            write_delays: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_write_delays(self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.write_delays.lock().unwrap().extend(delays);
        self
    }

    pub fn set_geometry(&self, rows: u16, cols: u16) {
        *self.geometry.lock().unwrap() = ViewportGeometry::new(rows, cols);
    }

    pub fn ops(&self) -> Vec<WidgetOp> {
        self.ops.lock().unwrap().clone()
    }

    /// Ops with the session's status lines filtered out.
    pub fn output_ops(&self) -> Vec<WidgetOp> {
        self.ops()
            .into_iter()
            .filter(|op| !matches!(op, WidgetOp::Write(data) if data.ends_with(b"process\r\n") || data.ends_with(b"created\r\n")))
            .collect()
    }

    pub fn text(&self) -> String {
        let written: Vec<u8> = self
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                WidgetOp::Write(data) => Some(data),
                _ => None,
            })
            .flatten()
            .collect();
        String::from_utf8_lossy(&written).into_owned()
    }

    /// Simulate the user typing; returns false if nobody listens.
    pub fn type_keys(&self, data: &[u8]) -> bool {
        match self.handler.lock().unwrap().as_ref() {
            Some(handler) => {
                handler(data.to_vec());
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl TerminalWidget for RecordingWidget {
    type Container = String;

    fn open(&self, container: String) {
        self.ops.lock().unwrap().push(WidgetOp::Open(container));
    }

    async fn clear(&self) {
        self.ops.lock().unwrap().push(WidgetOp::Clear);
    }

    async fn write(&self, data: &[u8]) {
        let delay = self.write_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.ops.lock().unwrap().push(WidgetOp::Write(data.to_vec()));
    }

    fn on_keystroke(&self, handler: KeystrokeHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn geometry(&self) -> ViewportGeometry {
        *self.geometry.lock().unwrap()
    }
}

enum Script {
    Respond(CreateProcessResponse),
    Fail(String),
}

/// Content API returning a canned answer, optionally held behind a gate.
pub struct ScriptedApi {
    script: Script,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    last_spec: Mutex<Option<ProcessSpec>>,
}

impl ScriptedApi {
    fn with_script(script: Script) -> Self {
        Self {
            script,
            gate: None,
            calls: AtomicUsize::new(0),
            last_spec: Mutex::new(None),
        }
    }

    pub fn created(id: &str, auth_code: &str) -> Self {
        Self::with_script(Script::Respond(CreateProcessResponse::created(
            SessionIdentity::new(id, auth_code),
        )))
    }

    pub fn rejected() -> Self {
        Self::with_script(Script::Respond(CreateProcessResponse::rejected(None)))
    }

    pub fn failing(reason: &str) -> Self {
        Self::with_script(Script::Fail(reason.to_string()))
    }

    /// Hold every response until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_spec(&self) -> Option<ProcessSpec> {
        self.last_spec.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentApi for ScriptedApi {
    async fn create_process(
        &self,
        spec: &ProcessSpec,
    ) -> Result<CreateProcessResponse, ContentApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_spec.lock().unwrap() = Some(spec.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.script {
            Script::Respond(response) => Ok(response.clone()),
            Script::Fail(reason) => Err(ContentApiError::Request(reason.clone())),
        }
    }
}

/// Channel whose first send waits until `gate` is notified.
pub struct GatedChannel {
    inner: MemoryChannel,
    hold: AtomicBool,
    gate: Arc<Notify>,
    entered: Arc<Notify>,
}

impl GatedChannel {
    pub fn new(inner: MemoryChannel, gate: Arc<Notify>) -> Self {
        Self {
            inner,
            hold: AtomicBool::new(true),
            gate,
            entered: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the held send is waiting on the gate.
    pub async fn held(&self) {
        self.entered.notified().await;
    }
}

#[async_trait]
impl Channel for GatedChannel {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn emit(&self, event: OutboundEvent) -> Result<(), TransportError> {
        if self.hold.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.emit(event).await
    }

    fn take_inbound(&self) -> Option<InboundStream> {
        self.inner.take_inbound()
    }
}
