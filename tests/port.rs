use simcomm::{Error, Operator, Port};

#[test]
fn vector_with_equal_dims_is_resizable() {
    let port = Port::new("out", Operator::OF, true, true, 1, &[20]).unwrap();
    assert!(port.is_vector());
    assert!(port.is_resizable());
    assert_eq!(port.length().unwrap(), 0);
}

#[test]
fn vector_with_one_extra_peer_dim_gets_fixed_length() {
    let port = Port::new("in", Operator::FInit, true, true, 1, &[20, 7]).unwrap();
    assert!(port.is_vector());
    assert!(!port.is_resizable());
    assert_eq!(port.length().unwrap(), 7);
}

#[test]
fn vector_with_fewer_peer_dims_is_rejected() {
    let result = Port::new("out", Operator::OF, true, true, 2, &[20]);
    assert!(matches!(result, Err(Error::PortShape { .. })));
}

#[test]
fn vector_with_two_extra_peer_dims_is_rejected() {
    let result = Port::new("in", Operator::FInit, true, true, 1, &[20, 7, 30]);
    assert!(matches!(result, Err(Error::PortShape { .. })));
}

#[test]
fn scalar_with_more_peer_dims_is_rejected() {
    let result = Port::new("in", Operator::FInit, false, true, 1, &[20, 7]);
    assert!(matches!(result, Err(Error::PortShape { .. })));
}

#[test]
fn scalar_peer_dim_boundaries() {
    // one fewer peer dimension is fine, that is the slotted case
    let port = Port::new("out", Operator::OF, false, true, 2, &[20]).unwrap();
    assert!(!port.is_vector());

    // two fewer is not addressable
    let result = Port::new("out", Operator::OF, false, true, 3, &[20]);
    assert!(matches!(result, Err(Error::PortShape { .. })));
}

#[test]
fn scalar_has_no_length_and_does_not_resize() {
    let mut port = Port::new("out", Operator::OF, false, true, 0, &[]).unwrap();
    assert!(!port.is_vector());
    assert!(!port.is_resizable());
    assert!(matches!(port.length(), Err(Error::NoLength(_))));
    assert!(matches!(port.set_length(10), Err(Error::NotResizable(_))));
}

#[test]
fn fixed_length_vector_does_not_resize() {
    let mut port = Port::new("in", Operator::FInit, true, true, 0, &[20]).unwrap();
    assert_eq!(port.length().unwrap(), 20);
    assert!(matches!(port.set_length(10), Err(Error::NotResizable(_))));
}

#[test]
fn resizable_vector_resizes() {
    let mut port = Port::new("out", Operator::OF, true, true, 1, &[20]).unwrap();
    port.set_length(13).unwrap();
    assert_eq!(port.length().unwrap(), 13);
}

#[test]
fn ports_start_open_and_close_per_slot() {
    let mut port = Port::new("in", Operator::FInit, true, true, 0, &[3]).unwrap();
    assert!(port.is_open(None));
    assert!(port.is_open(Some(1)));

    port.set_closed(Some(1));
    assert!(!port.is_open(Some(1)));
    assert!(port.is_open(Some(0)));
    assert!(!port.is_open(None));
}

#[test]
fn scalar_port_closes_whole() {
    let mut port = Port::new("in", Operator::FInit, false, true, 0, &[]).unwrap();
    assert!(port.is_open(None));
    port.set_closed(None);
    assert!(!port.is_open(None));
}

#[test]
fn operators_know_their_direction() {
    assert!(Operator::OF.allows_sending());
    assert!(Operator::OI.allows_sending());
    assert!(!Operator::FInit.allows_sending());
    assert!(Operator::FInit.allows_receiving());
    assert!(Operator::S.allows_receiving());
    assert!(Operator::B.allows_receiving());
    assert!(!Operator::OF.allows_receiving());
}
