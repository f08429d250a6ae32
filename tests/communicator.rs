//! End-to-end scenarios over the in-process direct transport.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::{dims, direct_registry, init_tracing, locations};
use simcomm::{
    Communicator, Conduit, Data, DirectHub, Error, Message, Operator, PeerInfo, PeerRegistry,
    Settings, TransportRegistry, Value,
};

// Wires up a 0-dimensional macro instance sending on `out` to a
// 0-dimensional micro instance receiving on `in`.
fn scalar_pair(hub: &Arc<DirectHub>) -> (Communicator, Communicator) {
    let a = Communicator::new("macro", vec![], None, direct_registry(hub)).unwrap();
    let b = Communicator::new("micro", vec![], None, direct_registry(hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    a.connect(
        &conduits,
        dims(&[("micro", &[])]),
        locations(&[("micro", b.get_locations())]),
    )
    .unwrap();
    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", a.get_locations())]),
    )
    .unwrap();
    (a, b)
}

#[test]
fn scalar_round_trip() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    a.send_message("out", &Message::new(0.0, Value::Binary(b"x".to_vec())), None)
        .unwrap();

    let message = b.receive_message("in", None, None).unwrap();
    assert_eq!(message.timestamp, 0.0);
    assert_eq!(message.next_timestamp, None);
    assert_eq!(message.data, Data::Value(Value::Binary(b"x".to_vec())));
    let settings = message.settings.expect("received messages carry settings");
    assert!(settings.is_empty());

    b.shutdown();
    a.shutdown();
}

#[test]
fn overlay_travels_with_the_message() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    let mut overlay = Settings::new();
    overlay.set("test2", "testing");
    let message = Message::new(2.0, Value::from(42))
        .with_next_timestamp(2.5)
        .with_settings(overlay.clone());
    a.send_message("out", &message, None).unwrap();

    let received = b.receive_message("in", None, None).unwrap();
    assert_eq!(received.timestamp, 2.0);
    assert_eq!(received.next_timestamp, Some(2.5));
    assert_eq!(received.settings, Some(overlay));

    b.shutdown();
    a.shutdown();
}

#[test]
fn settings_can_be_sent_as_payload() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    let mut settings = Settings::new();
    settings.set("test1", "testing");
    a.send_message("out", &Message::new(0.0, Data::Settings(settings.clone())), None)
        .unwrap();

    let received = b.receive_message("in", None, None).unwrap();
    let payload = received.data.as_settings().expect("expected settings payload");
    assert_eq!(payload.as_value(), settings.as_value());

    b.shutdown();
    a.shutdown();
}

#[test]
fn close_port_delivers_the_sentinel() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    a.close_port("out", None).unwrap();

    let message = b.receive_message("in", None, None).unwrap();
    assert!(message.data.is_close_port());
    assert_eq!(message.timestamp, f64::INFINITY);
    assert_eq!(message.next_timestamp, None);
    assert!(message.settings.unwrap().is_empty());

    // receiving the sentinel marks our side of the port closed
    assert!(!b.get_port("in").unwrap().is_open(None));

    b.shutdown();
    a.shutdown();
}

#[test]
fn sending_on_a_disconnected_port_is_dropped() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let mut declared = HashMap::new();
    declared.insert(Operator::OF, vec!["out".to_string(), "extra".to_string()]);
    let a = Communicator::new("macro", vec![], Some(declared), direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    a.connect(
        &conduits,
        dims(&[("micro", &[])]),
        locations(&[("micro", vec!["direct:micro".to_string()])]),
    )
    .unwrap();

    assert!(!a.get_port("extra").unwrap().is_connected());
    a.send_message("extra", &Message::new(0.0, Value::from("test")), None)
        .unwrap();
    assert!(a.post_office().is_empty());

    a.shutdown();
}

#[test]
fn receiving_on_a_disconnected_port_needs_a_default() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let mut declared = HashMap::new();
    declared.insert(Operator::FInit, vec!["in".to_string(), "extra".to_string()]);
    let b = Communicator::new("micro", vec![], Some(declared), direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", vec!["direct:macro".to_string()])]),
    )
    .unwrap();

    let result = b.receive_message("extra", None, None);
    assert!(matches!(result, Err(Error::Disconnected(_))));

    let mut overlay = Settings::new();
    overlay.set("test", true);
    let default = Message::new(3.0, Value::from("test")).with_next_timestamp(4.0);
    let default = default.with_settings(overlay.clone());
    let received = b
        .receive_message("extra", None, Some(default.clone()))
        .unwrap();
    assert_eq!(received, default);

    b.shutdown();
}

#[test]
fn slots_address_individual_peer_replicas() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());

    // macro is a single instance with a 20-slot vector port; micro is a
    // set of 20 instances with a scalar port each
    let a = Communicator::new("macro", vec![], None, direct_registry(&hub)).unwrap();
    let b = Communicator::new("micro", vec![13], None, direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    a.connect(
        &conduits,
        dims(&[("micro", &[20])]),
        locations(&[("micro[13]", b.get_locations())]),
    )
    .unwrap();
    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", a.get_locations())]),
    )
    .unwrap();

    let out = a.get_port("out").unwrap();
    assert!(out.is_vector());
    assert!(!out.is_resizable());
    assert_eq!(out.length().unwrap(), 20);
    assert!(!b.get_port("in").unwrap().is_vector());

    a.send_message("out", &Message::new(0.0, Value::from("test")), Some(13))
        .unwrap();
    let message = b.receive_message("in", None, None).unwrap();
    assert_eq!(message.data, Data::Value(Value::from("test")));

    let result = a.send_message("out", &Message::new(0.0, Value::from("test")), Some(25));
    match result {
        Err(Error::SlotOutOfBounds { port, slot, length }) => {
            assert_eq!(port, "out");
            assert_eq!(slot, 25);
            assert_eq!(length, 20);
        }
        other => panic!("expected slot out of bounds, got {:?}", other),
    }

    b.shutdown();
    a.shutdown();
}

#[test]
fn slotted_envelopes_split_the_receiver_reference() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let a = Communicator::new("macro", vec![], None, direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    a.connect(
        &conduits,
        dims(&[("micro", &[20])]),
        locations(&[("micro[13]", vec!["direct:micro[13]".to_string()])]),
    )
    .unwrap();

    a.send_message("out", &Message::new(0.0, Value::from("test")), Some(13))
        .unwrap();

    // the slot lands in the peer's index, not its slot, because the peer
    // set has one more dimension than ours
    let envelope = a.post_office().retrieve("micro[13].in").unwrap();
    assert_eq!(envelope.sender, "macro.out[13]");
    assert_eq!(envelope.receiver, "micro[13].in");
    assert_eq!(envelope.port_length, None);

    a.shutdown();
}

#[test]
fn resizable_ports_follow_the_sender() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());

    let mut a_ports = HashMap::new();
    a_ports.insert(Operator::OF, vec!["out[]".to_string()]);
    let mut b_ports = HashMap::new();
    b_ports.insert(Operator::FInit, vec!["in[]".to_string()]);

    let a = Communicator::new("macro", vec![], Some(a_ports), direct_registry(&hub)).unwrap();
    let b = Communicator::new("micro", vec![], Some(b_ports), direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    a.connect(
        &conduits,
        dims(&[("micro", &[])]),
        locations(&[("micro", b.get_locations())]),
    )
    .unwrap();
    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", a.get_locations())]),
    )
    .unwrap();

    // both sides have 0-dimensional instance sets, so the vector ports
    // are resizable and start empty
    assert!(a.get_port("out").unwrap().is_resizable());
    assert_eq!(a.get_port("out").unwrap().length().unwrap(), 0);

    let message = Message::new(0.0, Value::from("test"));
    let result = a.send_message("out", &message, Some(13));
    assert!(matches!(result, Err(Error::SlotOutOfBounds { .. })));

    a.set_port_length("out", 20).unwrap();
    a.send_message("out", &message, Some(13)).unwrap();

    let received = b.receive_message("in", Some(13), None).unwrap();
    assert_eq!(received.data, Data::Value(Value::from("test")));
    // the receiving side's length follows what the sender reported
    assert_eq!(b.get_port("in").unwrap().length().unwrap(), 20);

    b.shutdown();
    a.shutdown();
}

#[test]
fn declared_ports_take_their_shape_from_the_peer() {
    init_tracing();
    let mut declared = HashMap::new();
    declared.insert(Operator::FInit, vec!["in[]".to_string()]);
    declared.insert(
        Operator::OF,
        vec!["out1".to_string(), "out2[]".to_string()],
    );
    let communicator =
        Communicator::new("kernel", vec![13], Some(declared), TransportRegistry::new()).unwrap();

    let conduits = vec![
        Conduit::new("other1.out", "kernel.in"),
        Conduit::new("kernel.out1", "other.in"),
        Conduit::new("kernel.out2", "other3.in"),
    ];
    communicator
        .connect(
            &conduits,
            dims(&[("other1", &[20, 7]), ("other", &[25]), ("other3", &[20])]),
            HashMap::new(),
        )
        .unwrap();

    let in_port = communicator.get_port("in").unwrap();
    assert_eq!(in_port.operator(), Operator::FInit);
    assert!(in_port.is_vector());
    assert!(!in_port.is_resizable());
    assert_eq!(in_port.length().unwrap(), 7);

    let out1 = communicator.get_port("out1").unwrap();
    assert_eq!(out1.operator(), Operator::OF);
    assert!(!out1.is_vector());

    let out2 = communicator.get_port("out2").unwrap();
    assert_eq!(out2.operator(), Operator::OF);
    assert!(out2.is_resizable());
    assert_eq!(out2.length().unwrap(), 0);

    let listed = communicator.list_ports();
    assert_eq!(listed[&Operator::FInit], vec!["in".to_string()]);
    assert_eq!(
        listed[&Operator::OF],
        vec!["out1".to_string(), "out2".to_string()]
    );
    assert!(communicator.port_exists("out1"));
    assert!(!communicator.port_exists("nope"));

    communicator.shutdown();
}

#[test]
fn inferred_ports_follow_the_conduits() {
    init_tracing();
    let communicator =
        Communicator::new("kernel", vec![13], None, TransportRegistry::new()).unwrap();

    let conduits = vec![
        Conduit::new("other1.out", "kernel.in"),
        Conduit::new("kernel.out1", "other.in"),
        Conduit::new("kernel.out3", "other2.in"),
    ];
    communicator
        .connect(
            &conduits,
            dims(&[("other1", &[20, 7]), ("other", &[25]), ("other2", &[])]),
            HashMap::new(),
        )
        .unwrap();

    let in_port = communicator.get_port("in").unwrap();
    assert_eq!(in_port.operator(), Operator::FInit);
    assert!(in_port.is_vector());
    assert_eq!(in_port.length().unwrap(), 7);

    let out1 = communicator.get_port("out1").unwrap();
    assert_eq!(out1.operator(), Operator::OF);
    assert!(!out1.is_vector());

    let out3 = communicator.get_port("out3").unwrap();
    assert_eq!(out3.operator(), Operator::OF);
    assert!(!out3.is_vector());

    communicator.shutdown();
}

#[test]
fn doubly_vector_port_descriptions_are_rejected() {
    init_tracing();
    let mut declared = HashMap::new();
    declared.insert(Operator::FInit, vec!["in[][]".to_string()]);
    let communicator =
        Communicator::new("kernel", vec![13], Some(declared), TransportRegistry::new()).unwrap();

    let conduits = vec![Conduit::new("other.out", "kernel.in")];
    let result = communicator.connect(
        &conduits,
        dims(&[("other", &[20, 7, 30])]),
        HashMap::new(),
    );
    assert!(matches!(result, Err(Error::InvalidPortDescription(_))));

    communicator.shutdown();
}

#[test]
fn shape_mismatches_surface_at_connect_time() {
    init_tracing();
    let mut declared = HashMap::new();
    declared.insert(Operator::FInit, vec!["in[]".to_string()]);
    let communicator =
        Communicator::new("kernel", vec![13], Some(declared), TransportRegistry::new()).unwrap();

    let conduits = vec![Conduit::new("other.out", "kernel.in")];
    let result = communicator.connect(
        &conduits,
        dims(&[("other", &[20, 7, 30])]),
        HashMap::new(),
    );
    assert!(matches!(result, Err(Error::PortShape { .. })));

    communicator.shutdown();
}

#[test]
fn invalid_port_names_are_rejected() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    let message = Message::new(0.0, Value::from("test"));
    let result = a.send_message("[$invalid", &message, None);
    assert!(matches!(result, Err(Error::InvalidIdentifier(_))));

    let result = b.receive_message("@$invalid", None, None);
    assert!(matches!(result, Err(Error::InvalidIdentifier(_))));

    b.shutdown();
    a.shutdown();
}

// A stub of the central service, handing out a fixed peer resolution.
struct StubRegistry {
    info: PeerInfo,
    registered: Mutex<Option<(String, Vec<String>, Vec<(String, Operator)>)>>,
}

impl PeerRegistry for StubRegistry {
    fn register(
        &self,
        instance: &str,
        locations: &[String],
        ports: &[(String, Operator)],
    ) -> simcomm::Result<()> {
        *self.registered.lock().unwrap() = Some((
            instance.to_string(),
            locations.to_vec(),
            ports.to_vec(),
        ));
        Ok(())
    }

    fn resolve_peers(&self, _instance: &str) -> simcomm::Result<PeerInfo> {
        Ok(self.info.clone())
    }
}

#[test]
fn connect_via_registers_and_resolves() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());

    let mut declared = HashMap::new();
    declared.insert(Operator::OF, vec!["out".to_string()]);
    let a = Communicator::new("macro", vec![], Some(declared), direct_registry(&hub)).unwrap();
    let b = Communicator::new("micro", vec![], None, direct_registry(&hub)).unwrap();

    let conduits = vec![Conduit::new("macro.out", "micro.in")];
    let stub = StubRegistry {
        info: PeerInfo {
            conduits: conduits.clone(),
            peer_dims: dims(&[("micro", &[])]),
            peer_locations: locations(&[("micro", b.get_locations())]),
        },
        registered: Mutex::new(None),
    };
    a.connect_via(&stub).unwrap();

    let (instance, stub_locations, ports) =
        stub.registered.lock().unwrap().clone().unwrap();
    assert_eq!(instance, "macro");
    assert_eq!(stub_locations, a.get_locations());
    assert_eq!(ports, vec![("out".to_string(), Operator::OF)]);

    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", a.get_locations())]),
    )
    .unwrap();

    a.send_message("out", &Message::new(1.0, Value::from("test")), None)
        .unwrap();
    let received = b.receive_message("in", None, None).unwrap();
    assert_eq!(received.timestamp, 1.0);

    b.shutdown();
    a.shutdown();
}

#[test]
fn concurrent_receives_do_not_serialize() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let a = Communicator::new("macro", vec![], None, direct_registry(&hub)).unwrap();
    let b = Communicator::new("micro", vec![], None, direct_registry(&hub)).unwrap();

    let conduits = vec![
        Conduit::new("macro.one", "micro.first"),
        Conduit::new("macro.two", "micro.second"),
    ];
    a.connect(
        &conduits,
        dims(&[("micro", &[])]),
        locations(&[("micro", b.get_locations())]),
    )
    .unwrap();
    b.connect(
        &conduits,
        dims(&[("macro", &[])]),
        locations(&[("macro", a.get_locations())]),
    )
    .unwrap();

    std::thread::scope(|scope| {
        let first = scope.spawn(|| b.receive_message("first", None, None).unwrap());
        let second = scope.spawn(|| b.receive_message("second", None, None).unwrap());

        // deliver in the opposite order; each receive only sees its own port
        a.send_message("two", &Message::new(2.0, Value::from(2)), None)
            .unwrap();
        a.send_message("one", &Message::new(1.0, Value::from(1)), None)
            .unwrap();

        assert_eq!(first.join().unwrap().timestamp, 1.0);
        assert_eq!(second.join().unwrap().timestamp, 2.0);
    });

    b.shutdown();
    a.shutdown();
}

#[test]
fn messages_arrive_in_fifo_order() {
    init_tracing();
    let hub = Arc::new(DirectHub::new());
    let (a, b) = scalar_pair(&hub);

    for i in 0..10 {
        a.send_message("out", &Message::new(f64::from(i), Value::from(i)), None)
            .unwrap();
    }
    for i in 0..10 {
        let message = b.receive_message("in", None, None).unwrap();
        assert_eq!(message.timestamp, f64::from(i));
    }

    b.shutdown();
    a.shutdown();
}
