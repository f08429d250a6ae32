//! The mailbox set shared between a communicator and its servers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::outbox::Outbox;
use crate::transport::Envelope;

#[derive(Debug, Default)]
struct Mailroom {
    outboxes: HashMap<String, Arc<Outbox>>,
    shut_down: bool,
}

/// Holds one [`Outbox`] per receiving endpoint.
///
/// The post office decouples message production from transport-level
/// retrieval: the communicator deposits envelopes on the sending side, and
/// the transport servers pull them out to answer remote receive requests.
/// It is shared between the two through an `Arc`.
///
/// Outboxes are created lazily, on the first deposit to or retrieve from a
/// receiver, and are never removed for the life of the instance. A retrieve
/// may thus arrive before the first deposit and will block until a matching
/// envelope shows up.
#[derive(Debug, Default)]
pub struct PostOffice {
    mailroom: Mutex<Mailroom>,
}

impl PostOffice {
    /// Creates a PostOffice with no outboxes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deposits an envelope for the given receiver.
    pub fn deposit(&self, receiver: &str, envelope: Envelope) {
        debug!(receiver, "Depositing envelope");
        self.outbox(receiver).deposit(envelope);
    }

    /// Retrieves the next envelope for the given receiver, blocking until
    /// one is available.
    ///
    /// Returns `None` if the post office shuts down while waiting; servers
    /// translate that into an empty reply so remote receivers unblock.
    pub fn retrieve(&self, receiver: &str) -> Option<Envelope> {
        self.outbox(receiver).retrieve()
    }

    /// Returns whether no outbox currently holds an envelope.
    pub fn is_empty(&self) -> bool {
        let mailroom = self.mailroom.lock().expect("post office lock poisoned");
        mailroom.outboxes.values().all(|outbox| outbox.is_empty())
    }

    /// Shuts the post office down, waking every blocked retrieve.
    ///
    /// Already queued envelopes are still handed out. Idempotent; called by
    /// each server as it closes.
    pub fn shutdown(&self) {
        let mut mailroom = self.mailroom.lock().expect("post office lock poisoned");
        mailroom.shut_down = true;
        for outbox in mailroom.outboxes.values() {
            outbox.close();
        }
    }

    // Gets or creates the outbox for a receiver.
    fn outbox(&self, receiver: &str) -> Arc<Outbox> {
        let mut mailroom = self.mailroom.lock().expect("post office lock poisoned");
        let shut_down = mailroom.shut_down;
        mailroom
            .outboxes
            .entry(receiver.to_string())
            .or_insert_with(|| {
                let outbox = Arc::new(Outbox::new());
                if shut_down {
                    outbox.close();
                }
                outbox
            })
            .clone()
    }
}
