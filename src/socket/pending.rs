use crate::codec::Payload;
use std::collections::VecDeque;

/// Encoded payloads waiting for an open transport, oldest first.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    items: VecDeque<Payload>,
}

impl PendingQueue {
    pub(crate) fn push(&mut self, payload: Payload) {
        self.items.push_back(payload);
    }

    pub(crate) fn pop(&mut self) -> Option<Payload> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}
