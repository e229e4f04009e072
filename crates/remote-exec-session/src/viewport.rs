//! Viewport sizing policy.

use remote_exec_core::{CellMetrics, ContentApi, TerminalWidget, ViewportGeometry};
use remote_exec_transport::Channel;

use crate::controller::{ExecutionSession, SessionError};

/// Stateless transform from current widget geometry to a resize call.
///
/// Apply it on attach and whenever the embedder observes a container
/// resize. No debouncing happens here or in the controller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportPolicy;

impl ViewportPolicy {
    /// Resize the remote terminal to the widget's current grid.
    ///
    /// # Errors
    /// Propagates the controller's resize error.
    pub async fn apply<A, C, W>(
        session: &ExecutionSession<A, C, W>,
    ) -> Result<ViewportGeometry, SessionError>
    where
        A: ContentApi,
        C: Channel,
        W: TerminalWidget,
    {
        let geometry = session.widget().geometry();
        session.resize(geometry.rows, geometry.cols).await?;
        Ok(geometry)
    }

    /// Resize the remote terminal to fit a pixel area.
    ///
    /// # Errors
    /// Propagates the controller's resize error.
    pub async fn apply_pixels<A, C, W>(
        session: &ExecutionSession<A, C, W>,
        width_px: f32,
        height_px: f32,
        cell: CellMetrics,
    ) -> Result<ViewportGeometry, SessionError>
    where
        A: ContentApi,
        C: Channel,
        W: TerminalWidget,
    {
        let geometry = ViewportGeometry::fit(width_px, height_px, cell);
        session.resize(geometry.rows, geometry.cols).await?;
        Ok(geometry)
    }
}
