//! Local resolution of the global conduit topology.

use std::collections::HashMap;

use crate::conduit::{split_port_ref, Conduit};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Resolves, for one instance, which local port connects to which peer.
///
/// The peer manager is built once at connect time from the global conduit
/// list plus two maps: the dimensions of each peer kernel's instance set and
/// the network locations of each peer instance. It is immutable afterwards;
/// there is no dynamic re-wiring during a run.
#[derive(Debug)]
pub struct PeerManager {
    kernel: String,
    index: Vec<usize>,
    // Peer `kernel.port` references, indexed by local `kernel.port`.
    peers: HashMap<String, String>,
    // Instance set dimensions, indexed by peer kernel.
    peer_dims: HashMap<String, Vec<usize>>,
    // Network locations, indexed by peer instance reference.
    peer_locations: HashMap<String, Vec<String>>,
}

impl PeerManager {
    /// Creates a PeerManager for the instance `kernel[index]`.
    ///
    /// Conduits that neither start nor end at `kernel` are ignored; the
    /// central description may list the whole model.
    pub fn new(
        kernel: impl Into<String>,
        index: Vec<usize>,
        conduits: &[Conduit],
        peer_dims: HashMap<String, Vec<usize>>,
        peer_locations: HashMap<String, Vec<String>>,
    ) -> Self {
        let kernel = kernel.into();
        let mut peers = HashMap::new();
        for conduit in conduits {
            if conduit.sending_kernel() == kernel {
                // we send on the port this conduit attaches to
                peers.insert(conduit.sender().to_string(), conduit.receiver().to_string());
            }
            if conduit.receiving_kernel() == kernel {
                // we receive on the port this conduit attaches to
                peers.insert(conduit.receiver().to_string(), conduit.sender().to_string());
            }
        }

        Self {
            kernel,
            index,
            peers,
            peer_dims,
            peer_locations,
        }
    }

    /// Returns whether the given local port is connected at all.
    pub fn is_connected(&self, port: &str) -> bool {
        self.peers.contains_key(&self.full_port(port))
    }

    /// Returns the peer (kernel, port) pair for a local port.
    pub fn peer(&self, port: &str) -> Result<(&str, &str)> {
        let full = self.full_port(port);
        let peer = self
            .peers
            .get(&full)
            .ok_or_else(|| Error::UnknownPeer(full.clone()))?;
        Ok(split_port_ref(peer))
    }

    /// Returns the instance set dimensions of a peer kernel.
    pub fn peer_dims(&self, kernel: &str) -> Result<&[usize]> {
        self.peer_dims
            .get(kernel)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownPeer(kernel.to_string()))
    }

    /// Returns the advertised locations of a peer instance.
    pub fn peer_locations(&self, instance: &str) -> Result<&[String]> {
        self.peer_locations
            .get(instance)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UnknownPeer(instance.to_string()))
    }

    /// Determines the peer endpoint for a local port and slot.
    ///
    /// Our index and slot together address one conduit instance; the peer
    /// side splits that combined sequence at its own instance set's
    /// dimensionality. The leading part becomes the peer's index, the rest
    /// its slot. This is how a high-dimensional sender addresses one
    /// specific low-dimensional receiver, and vice versa.
    pub fn peer_endpoint(&self, port: &str, slot: &[usize]) -> Result<Endpoint> {
        let (peer_kernel, peer_port) = self.peer(port)?;
        let peer_ndims = self.peer_dims(peer_kernel)?.len();

        let mut total_index: Vec<usize> = self.index.clone();
        total_index.extend_from_slice(slot);

        let cut = peer_ndims.min(total_index.len());
        let peer_slot = total_index.split_off(cut);

        Ok(Endpoint::new(
            peer_kernel.to_string(),
            total_index,
            peer_port.to_string(),
            peer_slot,
        ))
    }

    fn full_port(&self, port: &str) -> String {
        format!("{}.{}", self.kernel, port)
    }
}
