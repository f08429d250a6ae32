//! The consumed interface of the central registration service.
//!
//! Instances register themselves and their ports with a central service and
//! ask it which peers and conduits concern them. That service is an external
//! collaborator: this module only specifies the contract the communicator
//! consumes, plus the data it hands back. Retry and backoff while waiting
//! for slow peers to show up is the caller's policy, not this crate's.

use std::collections::HashMap;

use crate::conduit::Conduit;
use crate::error::Result;
use crate::port::Operator;

/// Everything an instance needs to know about its peers.
///
/// Returned by [`PeerRegistry::resolve_peers`] once the instance's peer set
/// is complete: the conduits attached to this instance's kernel, the
/// instance set dimensions of each peer kernel, and the advertised network
/// locations of each peer instance.
#[derive(Debug, Clone, Default)]
pub struct PeerInfo {
    /// Conduits attached to this instance's kernel.
    pub conduits: Vec<Conduit>,
    /// Instance set dimensions, indexed by peer kernel name.
    pub peer_dims: HashMap<String, Vec<usize>>,
    /// Advertised locations, indexed by peer instance reference.
    pub peer_locations: HashMap<String, Vec<String>>,
}

/// A central registration and discovery service, as seen from one instance.
pub trait PeerRegistry {
    /// Registers an instance, the locations it can be reached at, and the
    /// ports it exposes.
    fn register(
        &self,
        instance: &str,
        locations: &[String],
        ports: &[(String, Operator)],
    ) -> Result<()>;

    /// Resolves the peers of a registered instance.
    ///
    /// Implementations may block until the peer set is complete; callers
    /// wanting liveness should poll with their own retry policy.
    fn resolve_peers(&self, instance: &str) -> Result<PeerInfo>;
}
