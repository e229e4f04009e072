//! Stream sink: inbound frames into the rendering widget.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use remote_exec_core::TerminalWidget;
use remote_exec_transport::InboundEvent;
use tokio::sync::watch;

/// Remote process status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    NotStarted,
    Running,
    Ended,
}

/// Pure forwarding stage between a channel and a widget.
///
/// Each write is awaited before the next event is taken, so frames reach
/// the widget in arrival order even when rendering is asynchronous.
pub struct StreamSink<W> {
    widget: Arc<W>,
    status: Arc<watch::Sender<ProcessStatus>>,
}

impl<W> Clone for StreamSink<W> {
    fn clone(&self) -> Self {
        Self {
            widget: Arc::clone(&self.widget),
            status: Arc::clone(&self.status),
        }
    }
}

impl<W: TerminalWidget> StreamSink<W> {
    /// Create a sink with its own status channel.
    #[must_use]
    pub fn new(widget: Arc<W>) -> Self {
        let (status, _) = watch::channel(ProcessStatus::NotStarted);
        Self::with_status(widget, Arc::new(status))
    }

    pub(crate) const fn with_status(
        widget: Arc<W>,
        status: Arc<watch::Sender<ProcessStatus>>,
    ) -> Self {
        Self { widget, status }
    }

    /// Subscribe to process status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ProcessStatus> {
        self.status.subscribe()
    }

    /// Apply one inbound event to the widget.
    pub async fn handle(&self, event: InboundEvent) {
        match event {
            InboundEvent::Started => {
                self.widget.clear().await;
                self.status.send_replace(ProcessStatus::Running);
                tracing::info!("Remote process started");
            }
            InboundEvent::Stream(frame) => {
                self.widget.write(&frame).await;
            }
            InboundEvent::Ended => {
                self.status.send_replace(ProcessStatus::Ended);
                tracing::info!("Remote process ended");
            }
        }
    }

    /// Drain `inbound` until it closes.
    pub async fn run<S>(self, inbound: S)
    where
        S: Stream<Item = InboundEvent> + Send,
    {
        tokio::pin!(inbound);

        let mut frames: u64 = 0;
        while let Some(event) = inbound.next().await {
            if matches!(event, InboundEvent::Stream(_)) {
                frames += 1;
            }
            self.handle(event).await;
        }
        tracing::debug!(frames, "Inbound stream closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use remote_exec_transport::{DEFAULT_NAMESPACE, MemoryChannel, channel::Channel};

    use super::*;
    use crate::test_support::{RecordingWidget, WidgetOp};

    fn frame(data: &'static [u8]) -> InboundEvent {
        InboundEvent::Stream(Bytes::from_static(data))
    }

    #[tokio::test]
    async fn test_frames_written_in_order_despite_slow_widget() {
        // The first write is the slowest; order must still hold
        let widget = Arc::new(RecordingWidget::new().with_write_delays([
            Duration::from_millis(30),
            Duration::from_millis(10),
            Duration::from_millis(0),
        ]));
        let sink = StreamSink::new(Arc::clone(&widget));

        sink.run(futures::stream::iter([frame(b"f1"), frame(b"f2"), frame(b"f3")]))
            .await;

        assert_eq!(
            widget.ops(),
            vec![
                WidgetOp::Write(b"f1".to_vec()),
                WidgetOp::Write(b"f2".to_vec()),
                WidgetOp::Write(b"f3".to_vec()),
            ]
        );
    }

    #[tokio::test]
    async fn test_started_clears_before_later_frames() {
        let widget = Arc::new(RecordingWidget::new());
        let sink = StreamSink::new(Arc::clone(&widget));
        let status = sink.status();

        sink.run(futures::stream::iter([
            frame(b"stale"),
            InboundEvent::Started,
            frame(b"fresh"),
        ]))
        .await;

        assert_eq!(
            widget.ops(),
            vec![
                WidgetOp::Write(b"stale".to_vec()),
                WidgetOp::Clear,
                WidgetOp::Write(b"fresh".to_vec()),
            ]
        );
        assert_eq!(*status.borrow(), ProcessStatus::Running);
    }

    #[tokio::test]
    async fn test_repeated_started_is_harmless() {
        let widget = Arc::new(RecordingWidget::new());
        let sink = StreamSink::new(Arc::clone(&widget));

        sink.run(futures::stream::iter([
            InboundEvent::Started,
            InboundEvent::Started,
            frame(b"out"),
        ]))
        .await;

        assert_eq!(widget.text(), "out");
    }

    #[tokio::test]
    async fn test_ended_updates_status() {
        let widget = Arc::new(RecordingWidget::new());
        let sink = StreamSink::new(Arc::clone(&widget));
        let status = sink.status();

        sink.run(futures::stream::iter([InboundEvent::Started, InboundEvent::Ended]))
            .await;

        assert_eq!(*status.borrow(), ProcessStatus::Ended);
    }

    #[tokio::test]
    async fn test_bytes_written_verbatim_from_channel() {
        let (channel, peer) = MemoryChannel::pair(DEFAULT_NAMESPACE);
        let widget = Arc::new(RecordingWidget::new());
        let sink = StreamSink::new(Arc::clone(&widget));
        let task = tokio::spawn(sink.run(channel.take_inbound().unwrap()));

        let mut expected = Vec::new();
        for i in 0..100u8 {
            let data = vec![0x1b, b'[', i, b'm', 0xff];
            expected.extend_from_slice(&data);
            peer.send(&InboundEvent::Stream(Bytes::from(data))).unwrap();
        }
        drop(peer);
        drop(channel);
        task.await.unwrap();

        let written: Vec<u8> = widget
            .ops()
            .into_iter()
            .flat_map(|op| match op {
                WidgetOp::Write(data) => data,
                _ => Vec::new(),
            })
            .collect();
        assert_eq!(written, expected);
    }
}
