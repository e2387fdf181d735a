// src/process/ring_buffer.rs

use std::collections::VecDeque;

/// Fixed-capacity FIFO. Once full, every push evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append `item`, returning the evicted entry if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    /// Oldest-first iteration.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl RingBuffer<String> {
    /// All chunks joined in arrival order.
    pub fn joined(&self) -> String {
        let total: usize = self.entries.iter().map(String::len).sum();
        let mut out = String::with_capacity(total);
        for chunk in &self.entries {
            out.push_str(chunk);
        }
        out
    }
}
