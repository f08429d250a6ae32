//! Conduits: typed connections between kernel ports.

// Splits a `kernel.port` reference into its kernel and port halves. The
// kernel may itself contain periods, so the port is the last segment.
pub(crate) fn split_port_ref(full: &str) -> (&str, &str) {
    match full.rsplit_once('.') {
        Some((kernel, port)) => (kernel, port),
        None => ("", full),
    }
}

/// A connection between a port on one kernel and a port on another.
///
/// Conduits exist at the kernel (type) level, not per replica: `sender` and
/// `receiver` are `kernel.port` references without index or slot. They are
/// provided by the central topology description and are read-only here; the
/// per-replica resolution happens in the
/// [`PeerManager`](crate::PeerManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conduit {
    sender: String,
    receiver: String,
}

impl Conduit {
    /// Creates a Conduit from `kernel.port` references for both ends.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
        }
    }

    /// The full `kernel.port` reference of the sending end.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The full `kernel.port` reference of the receiving end.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// The kernel that sends on this conduit.
    pub fn sending_kernel(&self) -> &str {
        split_port_ref(&self.sender).0
    }

    /// The port the sending kernel sends on.
    pub fn sending_port(&self) -> &str {
        split_port_ref(&self.sender).1
    }

    /// The kernel that receives on this conduit.
    pub fn receiving_kernel(&self) -> &str {
        split_port_ref(&self.receiver).0
    }

    /// The port the receiving kernel receives on.
    pub fn receiving_port(&self) -> &str {
        split_port_ref(&self.receiver).1
    }
}
