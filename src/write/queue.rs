//! Bounded FIFO of batches awaiting retry.

use std::collections::VecDeque;

use super::service::Batch;

/// Bounded retry queue with evict-oldest overflow semantics.
///
/// Ordering is strict insertion order, oldest first. The queue never holds
/// more than `capacity` batches.
pub(crate) struct RetryQueue {
    items: VecDeque<Batch>,
    capacity: usize,
}

impl RetryQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Append `batch`. When full, the front batch is dropped first and
    /// `true` is returned to report the overflow.
    pub(crate) fn push(&mut self, batch: Batch) -> bool {
        let mut overflowed = false;
        if self.items.len() == self.capacity {
            self.items.pop_front();
            overflowed = true;
        }
        self.items.push_back(batch);
        overflowed
    }

    /// Peek the oldest batch.
    pub(crate) fn first(&self) -> Option<&Batch> {
        self.items.front()
    }

    /// Remove the front batch only if it is the batch with the given id.
    pub(crate) fn remove_if_first(&mut self, id: u64) {
        if self.items.front().map(|b| b.id) == Some(id) {
            self.items.pop_front();
        }
    }

    /// Mutable access to the front batch, for attempt bookkeeping.
    pub(crate) fn first_mut(&mut self) -> Option<&mut Batch> {
        self.items.front_mut()
    }

    /// Whether a batch with the given id is still queued.
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.items.iter().any(|b| b.id == id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}
