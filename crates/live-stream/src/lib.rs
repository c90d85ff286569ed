//! Live Preview Streaming
//!
//! Edge devices push preview frames into a [`DeviceStreamRegistry`]; any
//! number of dashboard viewers read them back through a
//! [`StreamMultiplexer`] as a `multipart/x-mixed-replace` body.

mod multiplexer;
mod registry;

pub use multiplexer::{multipart_chunk, StreamMultiplexer, ViewerStream, BOUNDARY, CONTENT_TYPE, DEFAULT_POLL_INTERVAL};
pub use registry::{DeviceStreamRegistry, DeviceSummary, DEVICE_STALENESS, PUSH_STALENESS};
