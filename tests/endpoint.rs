use simcomm::Endpoint;

#[test]
fn reference_includes_index_and_slot() {
    let endpoint = Endpoint::new("test.kernel", vec![42], "out", vec![2]);
    assert_eq!(endpoint.kernel, "test.kernel");
    assert_eq!(endpoint.index, vec![42]);
    assert_eq!(endpoint.port, "out");
    assert_eq!(endpoint.slot, vec![2]);
    assert_eq!(endpoint.reference(), "test.kernel[42].out[2]");
    assert_eq!(endpoint.to_string(), "test.kernel[42].out[2]");
}

#[test]
fn reference_omits_empty_bracket_groups() {
    let endpoint = Endpoint::new("kernel", vec![], "port", vec![]);
    assert_eq!(endpoint.reference(), "kernel.port");

    let endpoint = Endpoint::new("kernel", vec![], "port", vec![3]);
    assert_eq!(endpoint.reference(), "kernel.port[3]");

    let endpoint = Endpoint::new("kernel", vec![7], "port", vec![]);
    assert_eq!(endpoint.reference(), "kernel[7].port");
}

#[test]
fn multi_dimensional_index_gets_one_group_per_dimension() {
    let endpoint = Endpoint::new("kernel", vec![1, 2], "port", vec![3]);
    assert_eq!(endpoint.reference(), "kernel[1][2].port[3]");
}

#[test]
fn instance_strips_port_and_slot() {
    let endpoint = Endpoint::new("test.kernel", vec![42], "port", vec![2]);
    assert_eq!(endpoint.instance(), "test.kernel[42]");

    let endpoint = Endpoint::new("test.kernel", vec![], "port", vec![]);
    assert_eq!(endpoint.instance(), "test.kernel");

    let endpoint = Endpoint::new("test.kernel", vec![], "port", vec![3]);
    assert_eq!(endpoint.instance(), "test.kernel");
}
