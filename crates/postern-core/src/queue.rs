//! Outbound transmission queue shared with the network actor

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::OutboundMessage;

/// Ordered queue of messages awaiting transmission
///
/// Cloning yields another handle to the same queue. Appends come from the
/// session owner; the network actor drains from the front.
#[derive(Debug, Clone, Default)]
pub struct MessageQueue {
    inner: Arc<Mutex<VecDeque<OutboundMessage>>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<OutboundMessage>> {
        // A panicking holder cannot leave the deque half-modified
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, message: OutboundMessage) {
        self.lock().push_back(message);
    }

    /// Take every queued message, oldest first
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.lock().drain(..).collect()
    }

    /// Remove and return the oldest queued message
    pub fn pop_front(&self) -> Option<OutboundMessage> {
        self.lock().pop_front()
    }

    /// Put a message back at the front after a failed transmission
    pub fn requeue_front(&self, message: OutboundMessage) {
        self.lock().push_front(message);
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Vec<OutboundMessage> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
