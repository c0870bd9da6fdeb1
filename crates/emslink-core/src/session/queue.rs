use std::collections::VecDeque;

use uuid::Uuid;

/// A serialized request waiting for the session to come online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QueuedRequest {
    pub id: Uuid,
    pub frame: String,
}

/// Bounded FIFO of requests issued while not authenticated.
///
/// Full queues evict from the front: the oldest request is the one most
/// likely to be stale by the time the session is back.
#[derive(Debug)]
pub(crate) struct RequestQueue {
    items: VecDeque<QueuedRequest>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Append a request, returning whatever had to make room for it.
    /// With zero capacity the request itself comes straight back.
    pub fn push(&mut self, request: QueuedRequest) -> Option<QueuedRequest> {
        if self.capacity == 0 {
            return Some(request);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(request);
        evicted
    }

    /// Take everything in FIFO order.
    pub fn take_all(&mut self) -> Vec<QueuedRequest> {
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
