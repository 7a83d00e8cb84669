//! Fixed-capacity per-channel ring buffer for the consumer side.

use std::collections::VecDeque;

/// Circular buffer of `(t_s, value)` pairs for one (sensor, channel) pair.
///
/// Insertion beyond capacity overwrites the oldest entry, bounding memory
/// regardless of stream duration. Owned exclusively by the stream ingest
/// task; readers only ever see [`ChannelBuffer::snapshot`] copies.
#[derive(Debug, Clone)]
pub struct ChannelBuffer {
    capacity: usize,
    buf: VecDeque<(f64, f64)>,
}

impl ChannelBuffer {
    /// New empty buffer. Capacity must be at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            buf: VecDeque::with_capacity(capacity),
        }
    }

    /// Append one point, dropping the oldest when full.
    pub fn push(&mut self, t_s: f64, value: f64) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back((t_s, value));
    }

    /// Point-in-time copy in arrival order.
    pub fn snapshot(&self) -> Vec<(f64, f64)> {
        self.buf.iter().copied().collect()
    }

    /// Entries currently held.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when no entry has arrived yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
