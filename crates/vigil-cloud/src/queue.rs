//! Bounded FIFO of unsent readings.
//!
//! Capacity is fixed at construction. When full, the oldest entry is
//! evicted to admit the newest — the cloud may observe gaps, never
//! unbounded memory growth. Not synchronized itself; the forwarder owns
//! it behind a lock shared by `enqueue` and the drain task.

use std::collections::VecDeque;

use vigil_core::Reading;

/// Bounded drop-oldest queue of readings awaiting delivery.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<Reading>,
    capacity: usize,
    dropped: u64,
}

impl PendingQueue {
    /// Create a queue holding at most `capacity` readings.
    ///
    /// A zero capacity is rounded up to one; a queue that can hold
    /// nothing would silently discard every reading.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append a reading, returning the evicted oldest entry if the queue
    /// was full.
    pub fn push(&mut self, reading: Reading) -> Option<Reading> {
        let evicted = if self.items.len() == self.capacity {
            self.dropped += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(reading);
        evicted
    }

    /// Clone up to `n` readings from the front, preserving order. The
    /// entries stay queued until [`Self::pop_front_n`] confirms delivery.
    #[must_use]
    pub fn peek_batch(&self, n: usize) -> Vec<Reading> {
        self.items.iter().take(n).cloned().collect()
    }

    /// Remove `n` delivered readings from the front.
    pub fn pop_front_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.items.pop_front().is_none() {
                break;
            }
        }
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of queued readings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total readings evicted due to overflow since construction.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Iterate the queued readings front to back.
    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.items.iter()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
