//! The communication engine tying ports, mailboxes and transports together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock};

use tracing::{debug, instrument, warn};

use crate::codec;
use crate::conduit::Conduit;
use crate::endpoint::{instance_ref, validate_port_name, Endpoint};
use crate::error::{Error, Result};
use crate::message::{Data, Message};
use crate::peer_manager::PeerManager;
use crate::port::{Operator, Port};
use crate::post_office::PostOffice;
use crate::registry::PeerRegistry;
use crate::settings::Settings;
use crate::transport::{Envelope, TransportClient, TransportRegistry, TransportServer};

/// The mailroom of one simulation instance.
///
/// A communicator owns the instance's ports, its outgoing mailboxes, and
/// its transport servers and clients. It sends and receives messages on
/// behalf of the instance, leaving the actual data transmission to the
/// transport kinds in its [`TransportRegistry`].
///
/// Usage follows the instance life cycle: create the communicator, register
/// its [locations](Communicator::get_locations) with the central service,
/// [connect](Communicator::connect) it to the resolved topology, exchange
/// messages, and [shut it down](Communicator::shutdown).
///
/// All messaging methods take `&self`; a communicator may be shared across
/// the instance's threads, and receives on different ports proceed
/// concurrently.
pub struct Communicator {
    kernel: String,
    index: Vec<usize>,
    declared_ports: Option<HashMap<Operator, Vec<String>>>,
    registry: TransportRegistry,
    post_office: Arc<PostOffice>,
    servers: Mutex<Vec<Box<dyn TransportServer>>>,
    // One cached client per peer instance, created on first use.
    clients: Mutex<HashMap<String, Arc<dyn TransportClient>>>,
    peer_manager: OnceLock<PeerManager>,
    // Written only on the receive path (resizes and close marks), read
    // everywhere else; see the concurrency notes on the crate root.
    ports: RwLock<HashMap<String, Port>>,
}

impl Communicator {
    /// Creates a Communicator for the instance `kernel[index]` and starts
    /// its transport servers.
    ///
    /// `declared_ports` lists the instance's ports per operator, each with
    /// an optional `[]` suffix marking it as a vector port. Pass `None` to
    /// have the port set inferred from the conduits at connect time
    /// instead.
    pub fn new(
        kernel: impl Into<String>,
        index: Vec<usize>,
        declared_ports: Option<HashMap<Operator, Vec<String>>>,
        registry: TransportRegistry,
    ) -> Result<Self> {
        let kernel = kernel.into();
        let post_office = Arc::new(PostOffice::new());

        let instance_id = instance_ref(&kernel, &index);
        let mut servers = Vec::new();
        for kind in registry.server_kinds() {
            servers.push(kind.start(&instance_id, post_office.clone())?);
        }

        Ok(Self {
            kernel,
            index,
            declared_ports,
            registry,
            post_office,
            servers: Mutex::new(servers),
            clients: Mutex::new(HashMap::new()),
            peer_manager: OnceLock::new(),
            ports: RwLock::new(HashMap::new()),
        })
    }

    /// Returns this instance's complete reference, e.g. `macro[13]`.
    pub fn instance_id(&self) -> String {
        instance_ref(&self.kernel, &self.index)
    }

    /// Returns the locations this instance can be reached at.
    ///
    /// One `scheme:rest` string per running transport server; register
    /// these with the central service so peers can find us.
    pub fn get_locations(&self) -> Vec<String> {
        self.servers
            .lock()
            .expect("server list lock poisoned")
            .iter()
            .map(|server| server.location())
            .collect()
    }

    /// Connects this communicator to its peers.
    ///
    /// This is the second stage of the wiring process, after every instance
    /// has registered its locations. The conduit list and the peer
    /// dimension and location maps come from the central service; the port
    /// set is derived here, from the declarations when given and from the
    /// conduits otherwise.
    #[instrument(skip_all, fields(instance = %self.instance_id()))]
    pub fn connect(
        &self,
        conduits: &[Conduit],
        peer_dims: HashMap<String, Vec<usize>>,
        peer_locations: HashMap<String, Vec<String>>,
    ) -> Result<()> {
        let peer_manager = PeerManager::new(
            self.kernel.clone(),
            self.index.clone(),
            conduits,
            peer_dims,
            peer_locations,
        );

        let ports = match &self.declared_ports {
            Some(declared) => self.ports_from_declared(declared, &peer_manager)?,
            None => self.ports_from_conduits(conduits, &peer_manager)?,
        };

        if self.peer_manager.set(peer_manager).is_err() {
            // topology is resolved once per run; the first connect wins
            warn!("connect() called more than once, keeping the existing topology");
            return Ok(());
        }
        debug!(count = ports.len(), "Derived port set");
        *self.ports.write().expect("port table lock poisoned") = ports;
        Ok(())
    }

    /// Registers this instance with a central service and connects to the
    /// peers it resolves.
    ///
    /// Convenience wrapper combining [`Communicator::get_locations`],
    /// [`PeerRegistry::register`], [`PeerRegistry::resolve_peers`] and
    /// [`Communicator::connect`].
    pub fn connect_via(&self, registry: &dyn PeerRegistry) -> Result<()> {
        let instance_id = self.instance_id();
        let locations = self.get_locations();
        let ports = match &self.declared_ports {
            Some(declared) => {
                let mut ports = Vec::new();
                for (&operator, port_list) in declared {
                    for description in port_list {
                        let (name, _) = split_port_description(description)?;
                        ports.push((name, operator));
                    }
                }
                ports
            }
            None => Vec::new(),
        };
        registry.register(&instance_id, &locations, &ports)?;
        let peers = registry.resolve_peers(&instance_id)?;
        self.connect(&peers.conduits, peers.peer_dims, peers.peer_locations)
    }

    /// Returns the names of this instance's ports, grouped by operator.
    ///
    /// Operators without ports are not included.
    pub fn list_ports(&self) -> HashMap<Operator, Vec<String>> {
        let ports = self.ports.read().expect("port table lock poisoned");
        let mut result: HashMap<Operator, Vec<String>> = HashMap::new();
        for port in ports.values() {
            result
                .entry(port.operator())
                .or_default()
                .push(port.name().to_string());
        }
        for names in result.values_mut() {
            names.sort();
        }
        result
    }

    /// Returns whether a port with the given name exists.
    pub fn port_exists(&self, port_name: &str) -> bool {
        self.ports
            .read()
            .expect("port table lock poisoned")
            .contains_key(port_name)
    }

    /// Returns a snapshot of the port with the given name.
    pub fn get_port(&self, port_name: &str) -> Result<Port> {
        self.ports
            .read()
            .expect("port table lock poisoned")
            .get(port_name)
            .cloned()
            .ok_or_else(|| Error::UnknownPort(port_name.to_string()))
    }

    /// Sets the length of a resizable vector port.
    ///
    /// The length of a resizable port is otherwise driven by what the
    /// sending side last reported; the sending side itself sets it here
    /// before addressing slots.
    pub fn set_port_length(&self, port_name: &str, length: usize) -> Result<()> {
        let mut ports = self.ports.write().expect("port table lock poisoned");
        let port = ports
            .get_mut(port_name)
            .ok_or_else(|| Error::UnknownPort(port_name.to_string()))?;
        port.set_length(length)
    }

    /// Sends a message on a port.
    ///
    /// Sending is non-blocking: the message is encoded and stored until the
    /// receiver asks for it, and this call returns as soon as that deposit
    /// is done. There is no acknowledgement and no backpressure.
    ///
    /// Sending on a disconnected port quietly drops the message; the
    /// topology may legitimately leave optional ports unwired, and the
    /// sender has no way to tell that apart locally.
    #[instrument(skip(self, message), fields(instance = %self.instance_id()))]
    pub fn send_message(
        &self,
        port_name: &str,
        message: &Message,
        slot: Option<usize>,
    ) -> Result<()> {
        validate_port_name(port_name)?;

        let (port_length, is_resizable) = {
            let ports = self.ports.read().expect("port table lock poisoned");
            let port = ports
                .get(port_name)
                .ok_or_else(|| Error::UnknownPort(port_name.to_string()))?;
            if let Some(slot) = slot {
                let length = port.length()?;
                if slot >= length {
                    return Err(Error::SlotOutOfBounds {
                        port: port_name.to_string(),
                        slot,
                        length,
                    });
                }
            }
            (port.length().ok(), port.is_resizable())
        };

        let slot_list: Vec<usize> = slot.into_iter().collect();
        let snd_endpoint = Endpoint::new(
            self.kernel.clone(),
            self.index.clone(),
            port_name,
            slot_list.clone(),
        );

        let peer_manager = self.peer_manager();
        if !peer_manager.is_connected(port_name) {
            debug!(port = port_name, "Dropping message sent on disconnected port");
            return Ok(());
        }
        let recv_endpoint = peer_manager.peer_endpoint(port_name, &slot_list)?;

        let overlay = message.settings.clone().unwrap_or_default();
        let envelope = Envelope {
            sender: snd_endpoint.reference(),
            receiver: recv_endpoint.reference(),
            port_length: if is_resizable { port_length } else { None },
            timestamp: message.timestamp,
            next_timestamp: message.next_timestamp,
            parameter_overlay: codec::encode_settings(&overlay),
            data: codec::encode_data(&message.data),
        };

        self.post_office.deposit(&recv_endpoint.reference(), envelope);
        Ok(())
    }

    /// Receives a message from a port.
    ///
    /// Receiving blocks: the sender's instance is contacted and the call
    /// waits until a message is available, however long that takes. There
    /// is no timeout at this layer.
    ///
    /// If the port is not connected, `default` is returned exactly as
    /// given; without a default, receiving on a disconnected port fails.
    ///
    /// The returned message always carries a settings overlay. As a side
    /// effect, a received envelope resizes the local port if it is
    /// resizable, and a port-closed sentinel marks the port (or slot)
    /// closed.
    #[instrument(skip(self, default), fields(instance = %self.instance_id()))]
    pub fn receive_message(
        &self,
        port_name: &str,
        slot: Option<usize>,
        default: Option<Message>,
    ) -> Result<Message> {
        validate_port_name(port_name)?;

        let slot_list: Vec<usize> = slot.into_iter().collect();
        let recv_endpoint = Endpoint::new(
            self.kernel.clone(),
            self.index.clone(),
            port_name,
            slot_list.clone(),
        );

        let peer_manager = self.peer_manager();
        if !peer_manager.is_connected(port_name) {
            return match default {
                Some(message) => Ok(message),
                None => Err(Error::Disconnected(port_name.to_string())),
            };
        }

        let snd_endpoint = peer_manager.peer_endpoint(port_name, &slot_list)?;
        let client = self.client_for(&snd_endpoint.instance())?;
        let envelope = client.receive(&recv_endpoint.reference())?;

        let overlay = codec::decode_settings(&envelope.parameter_overlay)?;
        let data = codec::decode_data(&envelope.data)?;

        {
            let mut ports = self.ports.write().expect("port table lock poisoned");
            if let Some(port) = ports.get_mut(port_name) {
                if let Some(length) = envelope.port_length {
                    if port.is_resizable() {
                        debug!(port = port_name, length, "Resizing port");
                        port.set_length(length)?;
                    }
                }
                if data.is_close_port() {
                    debug!(port = port_name, ?slot, "Port closed by peer");
                    port.set_closed(slot);
                }
            }
        }

        Ok(Message {
            timestamp: envelope.timestamp,
            next_timestamp: envelope.next_timestamp,
            data,
            settings: Some(overlay),
        })
    }

    /// Closes a port, or one slot of a vector port.
    ///
    /// This sends the port-closed sentinel, telling the connected instance
    /// that no more messages will arrive this way. The peer can use that to
    /// decide whether to shut down or keep running; the sentinel itself is
    /// delivered like any other message.
    pub fn close_port(&self, port_name: &str, slot: Option<usize>) -> Result<()> {
        let message = Message::new(f64::INFINITY, Data::ClosePort).with_settings(Settings::new());
        self.send_message(port_name, &message, slot)
    }

    /// Shuts the communicator down, closing clients and servers.
    ///
    /// Clients go first, then each transport kind's one-time teardown hook,
    /// then the servers; that way no in-flight request of ours waits on a
    /// server this process is about to stop. Errors on close are logged,
    /// not returned.
    #[instrument(skip(self), fields(instance = %self.instance_id()))]
    pub fn shutdown(&self) {
        let clients: Vec<_> = self
            .clients
            .lock()
            .expect("client cache lock poisoned")
            .drain()
            .collect();
        for (instance, client) in clients {
            if let Err(err) = client.close() {
                warn!(%err, %instance, "Failed to close client");
            }
        }

        let instance_id = self.instance_id();
        for kind in self.registry.client_kinds() {
            kind.teardown(&instance_id);
        }

        let mut servers = self.servers.lock().expect("server list lock poisoned");
        for server in servers.iter_mut() {
            server.close();
        }
        servers.clear();
    }

    /// The mailbox set servers pull envelopes from.
    ///
    /// Only needed when implementing a transport or inspecting mailboxes in
    /// tests.
    #[doc(hidden)]
    pub fn post_office(&self) -> &Arc<PostOffice> {
        &self.post_office
    }

    // Derives the port set from the supplied declarations.
    fn ports_from_declared(
        &self,
        declared: &HashMap<Operator, Vec<String>>,
        peer_manager: &PeerManager,
    ) -> Result<HashMap<String, Port>> {
        let mut ports = HashMap::new();
        for (&operator, port_list) in declared {
            for description in port_list {
                let (name, is_vector) = split_port_description(description)?;
                let is_connected = peer_manager.is_connected(&name);
                // A declared but disconnected port has no peer to take a
                // shape from; give it our own dimensionality so any shape
                // is acceptable.
                let peer_dims = if is_connected {
                    let (peer_kernel, _) = peer_manager.peer(&name)?;
                    peer_manager.peer_dims(peer_kernel)?.to_vec()
                } else {
                    vec![0; self.index.len()]
                };
                let port = Port::new(
                    name.clone(),
                    operator,
                    is_vector,
                    is_connected,
                    self.index.len(),
                    &peer_dims,
                )?;
                ports.insert(name, port);
            }
        }
        Ok(ports)
    }

    // Derives the port set from the conduits attached to our kernel.
    fn ports_from_conduits(
        &self,
        conduits: &[Conduit],
        peer_manager: &PeerManager,
    ) -> Result<HashMap<String, Port>> {
        let mut ports = HashMap::new();
        for conduit in conduits {
            let (port_name, operator, peer_kernel) = if conduit.sending_kernel() == self.kernel {
                (conduit.sending_port(), Operator::OF, conduit.receiving_kernel())
            } else if conduit.receiving_kernel() == self.kernel {
                (conduit.receiving_port(), Operator::FInit, conduit.sending_kernel())
            } else {
                continue;
            };
            let peer_dims = peer_manager.peer_dims(peer_kernel)?;
            let ndims = peer_dims.len().saturating_sub(self.index.len());
            let port = Port::new(
                port_name,
                operator,
                ndims == 1,
                peer_manager.is_connected(port_name),
                self.index.len(),
                peer_dims,
            )?;
            ports.insert(port_name.to_string(), port);
        }
        Ok(ports)
    }

    // Gets the cached client for a peer instance, or creates one.
    //
    // The cache lock is not held while connecting, so two threads may race
    // to create a client for the same peer; the first insert wins and the
    // loser's connection is closed rather than leaked.
    fn client_for(&self, instance: &str) -> Result<Arc<dyn TransportClient>> {
        if let Some(client) = self
            .clients
            .lock()
            .expect("client cache lock poisoned")
            .get(instance)
        {
            return Ok(client.clone());
        }

        let peer_manager = self.peer_manager();
        let locations = peer_manager.peer_locations(instance)?;
        let instance_id = self.instance_id();

        for kind in self.registry.client_kinds() {
            for location in locations {
                if !kind.can_connect_to(location) {
                    continue;
                }
                debug!(instance, %location, "Connecting to peer");
                let client: Arc<dyn TransportClient> =
                    Arc::from(kind.connect(&instance_id, location)?);

                let mut clients = self.clients.lock().expect("client cache lock poisoned");
                if let Some(existing) = clients.get(instance) {
                    let existing = existing.clone();
                    drop(clients);
                    if let Err(err) = client.close() {
                        warn!(%err, instance, "Failed to close duplicate client");
                    }
                    return Ok(existing);
                }
                clients.insert(instance.to_string(), client.clone());
                return Ok(client);
            }
        }

        Err(Error::NoMatchingProtocol {
            instance: instance.to_string(),
            locations: locations.to_vec(),
        })
    }

    fn peer_manager(&self) -> &PeerManager {
        self.peer_manager
            .get()
            .expect("connect() must be called before messaging")
    }
}

// Splits a declared port description into its name and vector-ness.
//
// A description is `name` or `name[]`; more than one `[]` suffix is
// invalid, since ports have at most one dimension.
fn split_port_description(description: &str) -> Result<(String, bool)> {
    let (name, is_vector) = match description.strip_suffix("[]") {
        Some(name) => (name, true),
        None => (description, false),
    };
    if name.ends_with("[]") {
        return Err(Error::InvalidPortDescription(description.to_string()));
    }
    validate_port_name(name)?;
    Ok((name.to_string(), is_vector))
}
