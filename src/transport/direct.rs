//! In-process direct transport.
//!
//! When two instances run in the same process they can skip the network:
//! the receiving side's client pulls envelopes straight out of the sending
//! side's post office. The hand-off point is a [`DirectHub`] shared by the
//! communicators involved; the hub is an explicitly created object, not a
//! process-wide singleton, so independent groups of communicators can each
//! have their own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{ClientKind, Envelope, ServerKind, TransportClient, TransportServer};
use crate::error::{Error, Result};
use crate::post_office::PostOffice;

const SCHEME: &str = "direct:";

/// The meeting point for communicators sharing a process.
///
/// Maps instance ids to their post offices. Servers register themselves
/// here; clients look their peers up by the id carried in the
/// `direct:<instance>` location string.
#[derive(Debug, Default)]
pub struct DirectHub {
    post_offices: Mutex<HashMap<String, Arc<PostOffice>>>,
}

impl DirectHub {
    /// Creates a hub with no registered instances.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, instance_id: &str, post_office: Arc<PostOffice>) {
        debug!(instance_id, "Registering instance with direct hub");
        self.post_offices
            .lock()
            .expect("direct hub lock poisoned")
            .insert(instance_id.to_string(), post_office);
    }

    fn deregister(&self, instance_id: &str) {
        debug!(instance_id, "Deregistering instance from direct hub");
        self.post_offices
            .lock()
            .expect("direct hub lock poisoned")
            .remove(instance_id);
    }

    fn lookup(&self, instance_id: &str) -> Option<Arc<PostOffice>> {
        self.post_offices
            .lock()
            .expect("direct hub lock poisoned")
            .get(instance_id)
            .cloned()
    }

    fn is_registered(&self, instance_id: &str) -> bool {
        self.post_offices
            .lock()
            .expect("direct hub lock poisoned")
            .contains_key(instance_id)
    }
}

// ============================================================================
// Client Side
// ============================================================================

/// Client kind for the direct transport.
pub struct DirectClientKind {
    hub: Arc<DirectHub>,
}

impl DirectClientKind {
    /// Creates a client kind connecting through the given hub.
    pub fn new(hub: Arc<DirectHub>) -> Self {
        Self { hub }
    }
}

impl ClientKind for DirectClientKind {
    /// A direct location is reachable iff its instance is registered with
    /// this hub; a `direct:` location from an instance in some other
    /// process is not ours to serve.
    fn can_connect_to(&self, location: &str) -> bool {
        location
            .strip_prefix(SCHEME)
            .is_some_and(|id| self.hub.is_registered(id))
    }

    fn connect(&self, _instance_id: &str, location: &str) -> Result<Box<dyn TransportClient>> {
        let peer = location
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Codec(format!("not a direct location: {}", location)))?;
        let post_office = self
            .hub
            .lookup(peer)
            .ok_or_else(|| Error::PeerGone(peer.to_string()))?;
        Ok(Box::new(DirectClient {
            post_office,
        }))
    }
}

struct DirectClient {
    post_office: Arc<PostOffice>,
}

impl TransportClient for DirectClient {
    fn receive(&self, receiver: &str) -> Result<Envelope> {
        self.post_office
            .retrieve(receiver)
            .ok_or_else(|| Error::PeerGone(receiver.to_string()))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Server Side
// ============================================================================

/// Server kind for the direct transport.
pub struct DirectServerKind {
    hub: Arc<DirectHub>,
}

impl DirectServerKind {
    /// Creates a server kind registering with the given hub.
    pub fn new(hub: Arc<DirectHub>) -> Self {
        Self { hub }
    }
}

impl ServerKind for DirectServerKind {
    fn start(
        &self,
        instance_id: &str,
        post_office: Arc<PostOffice>,
    ) -> Result<Box<dyn TransportServer>> {
        self.hub.register(instance_id, post_office.clone());
        Ok(Box::new(DirectServer {
            hub: self.hub.clone(),
            instance_id: instance_id.to_string(),
            post_office,
        }))
    }
}

struct DirectServer {
    hub: Arc<DirectHub>,
    instance_id: String,
    post_office: Arc<PostOffice>,
}

impl TransportServer for DirectServer {
    fn location(&self) -> String {
        format!("{}{}", SCHEME, self.instance_id)
    }

    fn close(&mut self) {
        self.hub.deregister(&self.instance_id);
        // unblocks clients still waiting on one of our outboxes
        self.post_office.shutdown();
    }
}
