use crate::net::{Adjacency, LinkId, NodeId, RoutingTable};

fn adjacency(edges: &[(u16, u16)]) -> Adjacency {
    let mut adj = Adjacency::new();
    for (i, &(a, b)) in edges.iter().enumerate() {
        adj.entry(NodeId(a)).or_default().push((NodeId(b), LinkId(i)));
    }
    adj
}

#[test]
fn first_hop_follows_shortest_path() {
    // 0 -> 1 -> 2 -> 3，另有 0 -> 4
    let adj = adjacency(&[(0, 1), (1, 2), (2, 3), (0, 4)]);
    let rt = RoutingTable::build(NodeId(0), &adj);

    assert_eq!(rt.next_link(NodeId(1)), Some(LinkId(0)));
    assert_eq!(rt.next_link(NodeId(3)), Some(LinkId(0)));
    assert_eq!(rt.next_link(NodeId(4)), Some(LinkId(3)));
    assert_eq!(rt.len(), 4);
}

#[test]
fn equal_cost_paths_prefer_first_configured_link() {
    // Diamond:
    // 0 -> 1 -> 3
    //  \-> 2 ->/
    let adj = adjacency(&[(0, 1), (0, 2), (1, 3), (2, 3)]);
    let rt = RoutingTable::build(NodeId(0), &adj);
    assert_eq!(rt.next_link(NodeId(3)), Some(LinkId(0)));

    let adj = adjacency(&[(0, 2), (0, 1), (1, 3), (2, 3)]);
    let rt = RoutingTable::build(NodeId(0), &adj);
    assert_eq!(rt.next_link(NodeId(3)), Some(LinkId(0)), "link 0 now leads via node 2");
}

#[test]
fn shorter_path_wins_over_configuration_order() {
    // 0 -> 1 -> 2 -> 3 declared first, direct 0 -> 3 declared last
    let adj = adjacency(&[(0, 1), (1, 2), (2, 3), (0, 3)]);
    let rt = RoutingTable::build(NodeId(0), &adj);
    assert_eq!(rt.next_link(NodeId(3)), Some(LinkId(3)));
}

#[test]
fn unreachable_and_self_have_no_route() {
    let adj = adjacency(&[(0, 1), (2, 0)]);
    let rt = RoutingTable::build(NodeId(0), &adj);
    assert_eq!(rt.next_link(NodeId(2)), None);
    assert_eq!(rt.next_link(NodeId(0)), None);
    assert_eq!(rt.next_link(NodeId(9)), None);

    let empty = RoutingTable::build(NodeId(7), &Adjacency::new());
    assert!(empty.is_empty());
}
