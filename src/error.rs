use thiserror::Error;

/// Convenience alias for results produced by this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for simcomm operations.
///
/// This encompasses all errors that can occur when wiring up and using a
/// [`Communicator`](crate::Communicator): invalid names and slots, topology
/// shape mismatches, disconnected ports, and transport-level failures.
///
/// None of these errors are retried internally. Topology is resolved once per
/// run and assumed stable, so a failure here means the operation failed for
/// good and the caller gets to decide what to do about it.
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Validation Errors
    // ============================================================================

    /// A kernel or port name does not follow the identifier rules.
    ///
    /// Identifiers start with a letter or underscore and contain only
    /// letters, digits and underscores. Kernel names may chain identifiers
    /// with periods.
    #[error("\"{0}\" is not a valid identifier")]
    InvalidIdentifier(String),

    /// A declared port description has more than one `[]` suffix.
    #[error("Port description \"{0}\" is invalid: ports can have at most one dimension")]
    InvalidPortDescription(String),

    /// The named port does not exist on this instance.
    #[error("Port \"{0}\" does not exist on this instance")]
    UnknownPort(String),

    /// A slot index was used that is outside the port's current length.
    #[error(
        "Slot out of bounds: slot {slot} of port \"{port}\" does not exist, \
         the port has length {length}"
    )]
    SlotOutOfBounds {
        port: String,
        slot: usize,
        length: usize,
    },

    // ============================================================================
    // Topology Errors
    // ============================================================================

    /// A port's vector-ness does not match the dimensions of the peer
    /// instance set it is connected to.
    ///
    /// A port may differ from its peer instance set by at most one
    /// dimension; anything else cannot be addressed.
    #[error("Port \"{port}\" has an incompatible shape: {reason}")]
    PortShape { port: String, reason: String },

    /// No known transport kind can connect to any of a peer's locations.
    #[error("Could not find a matching protocol for {instance} among {locations:?}")]
    NoMatchingProtocol {
        instance: String,
        locations: Vec<String>,
    },

    /// The topology has no peer registered where one was required.
    #[error("No peer is known for \"{0}\"")]
    UnknownPeer(String),

    // ============================================================================
    // Protocol Errors
    // ============================================================================

    /// Receive was called on a disconnected port without a default message.
    ///
    /// Sending on a disconnected port is not an error; messages are
    /// silently dropped, since the topology may legitimately leave optional
    /// ports unconnected.
    #[error(
        "Tried to receive on port \"{0}\", which is disconnected, and no default \
         was given; either pass a default or connect a sending component to this port"
    )]
    Disconnected(String),

    /// The peer went away before fulfilling a receive request.
    #[error("The peer serving \"{0}\" shut down before a message was available")]
    PeerGone(String),

    // ============================================================================
    // Resource Errors
    // ============================================================================

    /// The length of a scalar port was requested.
    #[error("Tried to get the length of scalar port \"{0}\"")]
    NoLength(String),

    /// A resize was attempted on a port that is not resizable.
    #[error("Tried to resize port \"{0}\", which is not resizable")]
    NotResizable(String),

    // ============================================================================
    // Transport Errors
    // ============================================================================

    /// Low-level I/O error from the operating system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data on the wire could not be decoded.
    #[error("Malformed data on the wire: {0}")]
    Codec(String),
}
