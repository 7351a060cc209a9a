//! Bounded byte queue used for the chat streams.

use std::collections::VecDeque;

/// A fixed-capacity FIFO of bytes. When full, pushing drops the oldest
/// byte, so a burst of typing can lose its beginning but never blocks.
#[derive(Debug, Clone)]
pub struct ByteRing {
    bytes: VecDeque<u8>,
    capacity: usize,
    overflowed: u64,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
            overflowed: 0,
        }
    }

    pub fn push(&mut self, byte: u8) {
        if self.bytes.len() == self.capacity {
            self.bytes.pop_front();
            self.overflowed += 1;
        }
        self.bytes.push_back(byte);
    }

    pub fn pop(&mut self) -> Option<u8> {
        self.bytes.pop_front()
    }

    /// Removes up to `N` bytes from the front, zero-filling the rest.
    pub fn take_chunk<const N: usize>(&mut self) -> [u8; N] {
        let mut chunk = [0; N];
        for slot in chunk.iter_mut() {
            match self.bytes.pop_front() {
                Some(b) => *slot = b,
                None => break,
            }
        }
        chunk
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes lost to overflow since creation.
    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }
}
