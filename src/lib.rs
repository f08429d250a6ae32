//! Simcomm - typed, timestamped message exchange for coupled simulations
//!
//! Simcomm is the communication core of a coupled-simulation framework:
//! independently running instances exchange messages over named, typed
//! ports, wired together by a conduit topology that is described centrally
//! and resolved locally. It handles endpoint addressing across instance-set
//! dimensionality mismatches, port inference and shape validation, mailbox
//! queueing, and transport selection by location prefix, with in-process
//! and TCP transports included.
//!
//! The entry point is the [`Communicator`]; see its documentation for the
//! instance life cycle.
//!
//! # Concurrency
//!
//! A communicator may be shared across an instance's threads. Sending never
//! blocks on network I/O; receiving blocks for the full round trip, with no
//! timeout at this layer, and receives on different ports proceed
//! independently. The per-receiver mailboxes are the only mutable state
//! shared with the transport servers and are safe under concurrent deposit
//! and blocking retrieval. A port's length is written only on the receive
//! path for that port and read on the send path for the same port; a given
//! port is assumed to be sent on or received on by one thread at a time,
//! which is how instances use their ports in practice.

// Internal-only modules
pub(crate) mod codec;
pub(crate) mod communicator;
pub(crate) mod conduit;
pub(crate) mod config;
pub(crate) mod endpoint;
pub(crate) mod error;
pub(crate) mod message;
pub(crate) mod outbox;
pub(crate) mod peer_manager;
pub(crate) mod port;
pub(crate) mod post_office;
pub(crate) mod registry;
pub(crate) mod settings;
pub(crate) mod transport;

// These are the intended public API
pub use communicator::Communicator;
pub use conduit::Conduit;
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use message::{Data, Message};
pub use outbox::Outbox;
pub use peer_manager::PeerManager;
pub use port::{Operator, Port};
pub use post_office::PostOffice;
pub use registry::{PeerInfo, PeerRegistry};
pub use settings::Settings;
pub use transport::{
    ClientKind, DirectClientKind, DirectHub, DirectServerKind, Envelope, ServerKind,
    TcpClientKind, TcpServerKind, TransportClient, TransportRegistry, TransportServer,
};

// The structured-value model payloads are built from.
pub use rmpv::Value;

/// Convenient re-exports of commonly used types.
pub mod prelude {
    pub use crate::communicator::Communicator;
    pub use crate::conduit::Conduit;
    pub use crate::error::{Error, Result};
    pub use crate::message::{Data, Message};
    pub use crate::port::Operator;
    pub use crate::settings::Settings;
    pub use crate::transport::{DirectHub, TransportRegistry};
    pub use rmpv::Value;
}

// Re-export functions that are only needed for testing
// Hidden from documentation to discourage use in production code
#[doc(hidden)]
pub use codec::{
    decode_data, decode_settings, decode_value, encode_data, encode_settings, encode_value,
};
