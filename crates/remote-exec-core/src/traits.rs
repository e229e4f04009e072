//! Core traits for the content API and the terminal rendering widget.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{CreateProcessResponse, ProcessSpec, ViewportGeometry};

/// Content API error.
#[derive(Debug, Error)]
pub enum ContentApiError {
    #[error("Request failed: {0}")]
    Request(String),
    #[error("Invalid response: {0}")]
    Decode(String),
}

/// The content API's process-creation operation.
///
/// This is the only content-API operation a session consumes.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Ask the server to create a sandboxed process.
    async fn create_process(
        &self,
        spec: &ProcessSpec,
    ) -> Result<CreateProcessResponse, ContentApiError>;
}

#[async_trait]
impl<T: ContentApi + ?Sized> ContentApi for Arc<T> {
    async fn create_process(
        &self,
        spec: &ProcessSpec,
    ) -> Result<CreateProcessResponse, ContentApiError> {
        (**self).create_process(spec).await
    }
}

/// Callback receiving raw bytes typed or pasted into the widget.
pub type KeystrokeHandler = Box<dyn Fn(Vec<u8>) + Send + Sync>;

/// Terminal rendering widget driven by a session.
///
/// The widget owns glyph layout and control-sequence interpretation;
/// sessions only clear it, write raw bytes to it and listen to it.
#[async_trait]
pub trait TerminalWidget: Send + Sync {
    /// Whatever the widget mounts into (a screen area, a DOM node, ...).
    type Container: Send;

    /// Mount the widget.
    fn open(&self, container: Self::Container);

    /// Clear the visible buffer.
    async fn clear(&self);

    /// Write raw output bytes verbatim.
    async fn write(&self, data: &[u8]);

    /// Write a status line followed by CRLF.
    async fn writeln(&self, line: &str) {
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        self.write(&data).await;
    }

    /// Register the keystroke callback, replacing any previous one.
    fn on_keystroke(&self, handler: KeystrokeHandler);

    /// Current character grid.
    fn geometry(&self) -> ViewportGeometry;
}
