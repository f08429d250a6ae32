//! Transport layer: the wire envelope, the client/server contracts, and the
//! registry of transport kinds.
//!
//! Transports are selected by location-string prefix: every location is of
//! the form `scheme:rest`, where the scheme never contains a colon and the
//! rest is each transport's own business. The registry holds an ordered list
//! of client kinds, tried in sequence against a peer's advertised locations,
//! plus the server kinds to start for the local instance.

mod direct;
mod tcp;

pub use direct::{DirectClientKind, DirectHub, DirectServerKind};
pub use tcp::{TcpClientKind, TcpServerKind};

use std::sync::Arc;

use ::config::Config;
use rmpv::Value;

use crate::codec;
use crate::config::{get_namespaced_bool, get_namespaced_string};
use crate::error::{Error, Result};
use crate::post_office::PostOffice;

const DEFAULT_TCP_BIND: &str = "127.0.0.1:0";

// ============================================================================
// Wire Envelope
// ============================================================================

/// The message structure that crosses the transport boundary.
///
/// An envelope wraps an already encoded payload and overlay together with
/// its addressing and timing metadata. It is transport-agnostic; every
/// conforming transport carries it unchanged.
///
/// The wire form is a MessagePack map with exactly these keys, in this
/// order: `sender`, `receiver`, `port_length`, `timestamp`,
/// `next_timestamp`, `parameter_overlay`, `data`. The two optional fields
/// encode as nil when absent. This layout is wire contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Reference of the sending endpoint.
    pub sender: String,
    /// Reference of the receiving endpoint.
    pub receiver: String,
    /// Current length of the sending vector port, if it is resizable.
    pub port_length: Option<usize>,
    /// Simulation time the payload is valid for.
    pub timestamp: f64,
    /// Simulation time of the next message on this port, if known.
    pub next_timestamp: Option<f64>,
    /// Encoded parameter overlay.
    pub parameter_overlay: Vec<u8>,
    /// Encoded payload.
    pub data: Vec<u8>,
}

impl Envelope {
    /// Encodes this envelope to its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let map = vec![
            (Value::from("sender"), Value::from(self.sender.as_str())),
            (Value::from("receiver"), Value::from(self.receiver.as_str())),
            (
                Value::from("port_length"),
                match self.port_length {
                    Some(length) => Value::from(length as u64),
                    None => Value::Nil,
                },
            ),
            (Value::from("timestamp"), Value::F64(self.timestamp)),
            (
                Value::from("next_timestamp"),
                match self.next_timestamp {
                    Some(timestamp) => Value::F64(timestamp),
                    None => Value::Nil,
                },
            ),
            (
                Value::from("parameter_overlay"),
                Value::Binary(self.parameter_overlay.clone()),
            ),
            (Value::from("data"), Value::Binary(self.data.clone())),
        ];
        codec::encode_value(&Value::Map(map))
    }

    /// Decodes an envelope from its wire form.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let entries = match codec::decode_value(bytes)? {
            Value::Map(entries) => entries,
            other => {
                return Err(Error::Codec(format!("expected an envelope map, got {}", other)))
            }
        };

        let mut sender = None;
        let mut receiver = None;
        let mut port_length = None;
        let mut timestamp = None;
        let mut next_timestamp = None;
        let mut parameter_overlay = None;
        let mut data = None;

        for (key, value) in entries {
            match key.as_str() {
                Some("sender") => sender = Some(decode_str("sender", &value)?),
                Some("receiver") => receiver = Some(decode_str("receiver", &value)?),
                Some("port_length") => {
                    if !value.is_nil() {
                        let length = value.as_u64().ok_or_else(|| {
                            Error::Codec(format!("invalid envelope port_length {}", value))
                        })?;
                        port_length = Some(length as usize);
                    }
                }
                Some("timestamp") => {
                    timestamp = Some(decode_f64("timestamp", &value)?);
                }
                Some("next_timestamp") => {
                    if !value.is_nil() {
                        next_timestamp = Some(decode_f64("next_timestamp", &value)?);
                    }
                }
                Some("parameter_overlay") => {
                    parameter_overlay = Some(decode_bin("parameter_overlay", value)?);
                }
                Some("data") => data = Some(decode_bin("data", value)?),
                _ => {
                    return Err(Error::Codec(format!("unexpected envelope key {}", key)));
                }
            }
        }

        Ok(Self {
            sender: sender.ok_or_else(|| missing("sender"))?,
            receiver: receiver.ok_or_else(|| missing("receiver"))?,
            port_length,
            timestamp: timestamp.ok_or_else(|| missing("timestamp"))?,
            next_timestamp,
            parameter_overlay: parameter_overlay.ok_or_else(|| missing("parameter_overlay"))?,
            data: data.ok_or_else(|| missing("data"))?,
        })
    }
}

fn missing(key: &str) -> Error {
    Error::Codec(format!("envelope is missing the {} field", key))
}

fn decode_str(key: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Codec(format!("invalid envelope {} {}", key, value)))
}

fn decode_f64(key: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| Error::Codec(format!("invalid envelope {} {}", key, value)))
}

fn decode_bin(key: &str, value: Value) -> Result<Vec<u8>> {
    match value {
        Value::Binary(bytes) => Ok(bytes),
        other => Err(Error::Codec(format!("invalid envelope {} {}", key, other))),
    }
}

// ============================================================================
// Client/Server Contracts
// ============================================================================

/// A connection to one peer instance, used to pull messages from it.
///
/// Clients are cached per peer instance by the communicator and may be
/// shared across threads; a client must serialize its own request/response
/// traffic internally if its medium requires it.
pub trait TransportClient: Send + Sync {
    /// Requests the next envelope addressed to `receiver` and blocks until
    /// the peer's server delivers it.
    ///
    /// There is no timeout at this layer; a connected but silent peer
    /// blocks the caller indefinitely. Fails with
    /// [`Error::PeerGone`](crate::Error::PeerGone) if the peer shuts down
    /// before a message is available.
    fn receive(&self, receiver: &str) -> Result<Envelope>;

    /// Releases the connection.
    fn close(&self) -> Result<()>;
}

/// A server answering receive requests from remote instances.
///
/// On each incoming request naming a receiver reference, the server blocks
/// on that receiver's outbox and returns the next envelope, or an empty
/// reply once the post office has shut down.
pub trait TransportServer: Send {
    /// The location this server listens on, of the form `scheme:rest`.
    fn location(&self) -> String;

    /// Stops listening, draining requests already in flight.
    fn close(&mut self);
}

/// One kind of transport, from the client side.
///
/// A kind is a capability predicate plus a connection factory; the
/// communicator walks its list of kinds in preference order and connects
/// through the first one that recognizes a peer location.
pub trait ClientKind: Send + Sync {
    /// Returns whether this kind can connect to the given location.
    fn can_connect_to(&self, location: &str) -> bool;

    /// Establishes a connection from `instance_id` to `location`.
    fn connect(&self, instance_id: &str, location: &str) -> Result<Box<dyn TransportClient>>;

    /// One-time teardown hook for shared per-kind state, invoked at
    /// shutdown after all of the instance's clients have been closed.
    fn teardown(&self, _instance_id: &str) {}
}

/// One kind of transport, from the server side.
pub trait ServerKind: Send + Sync {
    /// Starts a server for `instance_id` serving envelopes out of
    /// `post_office`.
    fn start(
        &self,
        instance_id: &str,
        post_office: Arc<PostOffice>,
    ) -> Result<Box<dyn TransportServer>>;
}

// ============================================================================
// Transport Registry
// ============================================================================

/// The set of transport kinds available to one communicator.
///
/// The registry is an explicitly constructed, passed-in collection; it is
/// owned by the communicator rather than being process-global state, so
/// several communicators (in tests, or co-located instances) can run with
/// different transport setups without interfering.
///
/// Client kinds are tried in the order they were added; put the cheapest
/// first.
#[derive(Default)]
pub struct TransportRegistry {
    client_kinds: Vec<Box<dyn ClientKind>>,
    server_kinds: Vec<Box<dyn ServerKind>>,
}

impl TransportRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client kind, after any already present.
    pub fn with_client_kind(mut self, kind: impl ClientKind + 'static) -> Self {
        self.client_kinds.push(Box::new(kind));
        self
    }

    /// Adds a server kind, after any already present.
    pub fn with_server_kind(mut self, kind: impl ServerKind + 'static) -> Self {
        self.server_kinds.push(Box::new(kind));
        self
    }

    /// Builds a registry from configuration.
    ///
    /// Configuration lookup is namespaced by `name` the usual way:
    /// `{name}.{key}` first, then `{key}`, then the default.
    ///
    /// # Configuration Keys
    ///
    /// - `enable_direct`: offer the in-process direct transport
    ///   (default true)
    /// - `enable_tcp`: offer the TCP transport (default true)
    /// - `tcp_bind`: bind address for the TCP server
    ///   (default `127.0.0.1:0`)
    ///
    /// The direct transport is preferred over TCP when both can reach a
    /// peer.
    pub fn from_config(config: &Config, name: &str, hub: Arc<DirectHub>) -> Self {
        let mut registry = Self::new();

        if get_namespaced_bool(config, name, "enable_direct").unwrap_or(true) {
            registry = registry
                .with_client_kind(DirectClientKind::new(hub.clone()))
                .with_server_kind(DirectServerKind::new(hub));
        }

        if get_namespaced_bool(config, name, "enable_tcp").unwrap_or(true) {
            let bind = get_namespaced_string(config, name, "tcp_bind")
                .unwrap_or_else(|_| DEFAULT_TCP_BIND.to_string());
            registry = registry
                .with_client_kind(TcpClientKind)
                .with_server_kind(TcpServerKind::new(bind));
        }

        registry
    }

    pub(crate) fn client_kinds(&self) -> &[Box<dyn ClientKind>] {
        &self.client_kinds
    }

    pub(crate) fn server_kinds(&self) -> &[Box<dyn ServerKind>] {
        &self.server_kinds
    }
}
