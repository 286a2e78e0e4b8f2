use crate::net::{NodeId, NodeKind};
use crate::sim::SimTime;
use crate::topo::{
    DumbbellOpts, LinkSpec, TopologyError, TopologySpec, build_dumbbell, parse_topology,
};

const SAMPLE: &str = "
# two hosts behind one router
host h0 1
host h1 2
router r0 10

link h0 r0 65536 1000000000 100
link r0 h1 4096 10000000 250
";

#[test]
fn parses_hosts_routers_and_links() {
    let spec = parse_topology(SAMPLE).expect("sample parses");

    assert_eq!(spec.nodes.len(), 3);
    assert_eq!(spec.nodes[2].kind, NodeKind::Router);
    assert_eq!(spec.nodes[2].id, 10);
    assert_eq!(
        spec.links[1],
        LinkSpec {
            a: "r0".into(),
            b: "h1".into(),
            queue_bytes: 4096,
            bandwidth_bps: 10_000_000,
            latency_us: 250,
        }
    );
}

#[test]
fn built_network_has_duplex_links_and_routes() {
    let net = parse_topology(SAMPLE).expect("parse").build_network();

    let (h0, h1, r0) = (NodeId(1), NodeId(2), NodeId(10));
    let fwd = net.link_between(r0, h1).expect("r0 -> h1");
    let back = net.link_between(h1, r0).expect("h1 -> r0");
    assert_ne!(fwd, back);
    assert_eq!(net.link(fwd).latency, SimTime::from_micros(250));
    assert_eq!(net.link(back).buffer_bytes, 4096);

    let first = net
        .node(h0)
        .and_then(|n| n.routes().next_link(h1))
        .expect("h0 routes to h1");
    assert_eq!(net.link(first).to, r0);
}

#[test]
fn malformed_files_are_rejected() {
    let cases = [
        ("host h0", "expects"),
        ("host h0 x", "not a valid number"),
        ("host h0 70000", "not a valid number"),
        ("switch s0 1", "unknown directive"),
        ("host h0 1\nlink h0 h9 1 1 1", "unknown node"),
        ("host h0 1\nhost h1 1", "duplicate node id"),
        ("host h0 1\nrouter h0 2", "duplicate node name"),
        ("host h0 1\nlink h0 h0 1 1 1", "itself"),
        ("host h0 1\nhost h1 2\nlink h0 h1 1 fast 1", "bandwidthBps"),
    ];
    for (text, needle) in cases {
        let err = parse_topology(text).expect_err(text);
        let msg = err.to_string();
        assert!(msg.contains(needle), "`{text}` gave `{msg}`, wanted `{needle}`");
    }
}

#[test]
fn parse_error_reports_line_number() {
    let err = parse_topology("# header\n\nhost h0 1\nbogus").expect_err("bad directive");
    assert!(matches!(err, TopologyError::Parse { line: 4, .. }));
}

#[test]
fn json_form_round_trips_and_is_validated() {
    let spec = parse_topology(SAMPLE).expect("parse");
    let json = spec.to_json().expect("to json");
    assert_eq!(TopologySpec::from_json(&json).expect("from json"), spec);

    let bad = r#"{"nodes":[{"name":"a","id":1,"kind":"host"}],
                  "links":[{"a":"a","b":"b","queue_bytes":1,"bandwidth_bps":1,"latency_us":1}]}"#;
    assert!(matches!(
        TopologySpec::from_json(bad),
        Err(TopologyError::UnknownNode { .. })
    ));
    assert!(matches!(
        TopologySpec::from_json("{not json"),
        Err(TopologyError::Json(_))
    ));
}

#[test]
fn dumbbell_routes_through_both_routers() {
    let mut net = crate::net::Network::default();
    let opts = DumbbellOpts::default();
    let (h0, h1) = build_dumbbell(&mut net, &opts);

    assert_eq!(net.nodes().count(), 4);
    assert_eq!(net.links().len(), 6);
    let r0 = net.node_by_name("r0").expect("r0").id();
    let r1 = net.node_by_name("r1").expect("r1").id();
    let bottleneck = net.link_between(r0, r1).expect("r0 -> r1");
    assert_eq!(net.link(bottleneck).bandwidth_bps, opts.bottleneck_bps);
    assert_eq!(net.link(bottleneck).buffer_bytes, opts.bottleneck_buffer_bytes);

    let hop = net.node(h0).and_then(|n| n.routes().next_link(h1)).expect("route");
    assert_eq!(net.link(hop).to, r0);
}
