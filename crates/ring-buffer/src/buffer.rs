//! Drop-Oldest Ring Buffer Implementation

use crate::RingError;
use std::collections::VecDeque;

/// Default buffer capacity (10 frames, ~1s of preview at 10fps)
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded FIFO buffer; pushing into a full buffer evicts the oldest entry.
///
/// Not synchronized. Callers that share it across tasks wrap it in a lock.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Entries, oldest at the front
    storage: VecDeque<T>,
    /// Hard capacity
    capacity: usize,
    /// Total entries ever pushed (for statistics)
    total_written: u64,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with given capacity
    pub fn new(capacity: usize) -> Result<Self, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        Ok(Self {
            storage: VecDeque::with_capacity(capacity),
            capacity,
            total_written: 0,
        })
    }

    /// Create a buffer with default capacity (10 entries)
    pub fn with_default_capacity() -> Self {
        Self {
            storage: VecDeque::with_capacity(DEFAULT_CAPACITY),
            capacity: DEFAULT_CAPACITY,
            total_written: 0,
        }
    }

    /// Push an entry, returning the evicted oldest entry if the buffer was full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.storage.len() >= self.capacity {
            self.storage.pop_front()
        } else {
            None
        };
        self.storage.push_back(item);
        self.total_written += 1;
        evicted
    }

    /// Most recently pushed entry, without removing it
    pub fn latest(&self) -> Option<&T> {
        self.storage.back()
    }

    /// Get the number of entries currently in the buffer
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Get total entries pushed over the buffer's lifetime
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of all entries, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.iter().cloned().collect()
    }
}
