//! Bounded Ring Buffer
//!
//! FIFO buffer with a hard capacity that evicts the oldest entry on overflow
//! instead of rejecting the new one. Used to hold the last few frames pushed
//! by each edge device.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};

use thiserror::Error;

/// Ring buffer construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("Ring buffer capacity must be at least 1")]
    ZeroCapacity,
}
