//! Per-receiver message queues.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::transport::Envelope;

#[derive(Debug, Default)]
struct Queue {
    envelopes: VecDeque<Envelope>,
    closed: bool,
}

/// Stores envelopes to be retrieved by one particular receiver.
///
/// An outbox is a FIFO queue: envelopes are deposited by the sending side
/// and retrieved in the same order by the transport server answering the
/// receiver's requests. Deposits never block beyond the queue lock;
/// retrieval blocks until an envelope arrives or the outbox is closed.
///
/// Deposits may race from several sending threads; retrieval comes from a
/// single server thread per pending request. FIFO order per receiver is
/// guaranteed either way.
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Mutex<Queue>,
    available: Condvar,
}

impl Outbox {
    /// Creates an empty Outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts an envelope at the back of the queue.
    pub fn deposit(&self, envelope: Envelope) {
        let mut queue = self.queue.lock().expect("outbox lock poisoned");
        queue.envelopes.push_back(envelope);
        self.available.notify_one();
    }

    /// Removes and returns the envelope at the front of the queue.
    ///
    /// Blocks while the queue is empty. Returns `None` once the outbox has
    /// been closed and drained; a pending retrieve is woken by the close.
    pub fn retrieve(&self) -> Option<Envelope> {
        let mut queue = self.queue.lock().expect("outbox lock poisoned");
        loop {
            if let Some(envelope) = queue.envelopes.pop_front() {
                return Some(envelope);
            }
            if queue.closed {
                return None;
            }
            queue = self
                .available
                .wait(queue)
                .expect("outbox lock poisoned");
        }
    }

    /// Returns the number of queued envelopes.
    pub fn len(&self) -> usize {
        self.queue.lock().expect("outbox lock poisoned").envelopes.len()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes the outbox, waking all blocked retrieves.
    ///
    /// Envelopes already queued are still handed out; only an empty, closed
    /// outbox yields `None`.
    pub fn close(&self) {
        let mut queue = self.queue.lock().expect("outbox lock poisoned");
        queue.closed = true;
        self.available.notify_all();
    }
}
