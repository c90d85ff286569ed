//! Multipart preview streams, one polling task per viewer

use crate::registry::DeviceStreamRegistry;
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Multipart boundary token
pub const BOUNDARY: &str = "frame";

/// Response content type for a preview stream
pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Delay between two reads of the registry by one viewer
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wrap one JPEG as a multipart part
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let mut chunk = BytesMut::with_capacity(jpeg.len() + 64);
    chunk.put_slice(b"--");
    chunk.put_slice(BOUNDARY.as_bytes());
    chunk.put_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    chunk.put_slice(jpeg);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

/// Fans the registry out to any number of independent viewers
#[derive(Clone)]
pub struct StreamMultiplexer {
    registry: DeviceStreamRegistry,
    poll_interval: Duration,
    /// Pre-wrapped placeholder part, sent while a device has no frame
    placeholder: Option<Bytes>,
    viewers: Arc<AtomicUsize>,
}

impl StreamMultiplexer {
    pub fn new(registry: DeviceStreamRegistry, poll_interval: Duration) -> Self {
        Self {
            registry,
            poll_interval,
            placeholder: None,
            viewers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Image sent while a device has nothing buffered. Without one the
    /// viewer loop skips that tick.
    pub fn with_placeholder(mut self, jpeg: &[u8]) -> Self {
        self.placeholder = Some(multipart_chunk(jpeg));
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Viewers currently attached across all devices
    pub fn viewer_count(&self) -> usize {
        self.viewers.load(Ordering::Relaxed)
    }

    /// Attach a viewer to a device.
    ///
    /// The returned stream never ends by itself. Dropping it (the transport
    /// went away) stops the polling task within one poll interval.
    pub fn subscribe(&self, device_id: &str) -> ViewerStream {
        // One slot: a slow viewer backpressures only its own task
        let (tx, rx) = mpsc::channel(1);

        let guard = ViewerGuard::attach(Arc::clone(&self.viewers), device_id);
        let registry = self.registry.clone();
        let placeholder = self.placeholder.clone();
        let poll_interval = self.poll_interval;
        let device_id = device_id.to_string();

        tokio::spawn(async move {
            let _guard = guard;
            loop {
                let chunk = match registry.latest(&device_id) {
                    Some(frame) => Some(multipart_chunk(&frame)),
                    None => placeholder.clone(),
                };
                if let Some(chunk) = chunk {
                    if tx.send(chunk).await.is_err() {
                        break;
                    }
                }

                tokio::select! {
                    _ = tokio::time::sleep(poll_interval) => {}
                    _ = tx.closed() => break,
                }
            }
        });

        ViewerStream { rx }
    }
}

/// Counts a viewer for as long as its task lives
struct ViewerGuard {
    viewers: Arc<AtomicUsize>,
    device_id: String,
}

impl ViewerGuard {
    fn attach(viewers: Arc<AtomicUsize>, device_id: &str) -> Self {
        let count = viewers.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::gauge!("stream_viewers").increment(1.0);
        info!(device_id, viewers = count, "Viewer attached");
        Self {
            viewers,
            device_id: device_id.to_string(),
        }
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        let count = self.viewers.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::gauge!("stream_viewers").decrement(1.0);
        debug!(device_id = %self.device_id, viewers = count, "Viewer detached");
    }
}

/// Body stream handed to the HTTP layer
pub struct ViewerStream {
    rx: mpsc::Receiver<Bytes>,
}

impl Stream for ViewerStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}
