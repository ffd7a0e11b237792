use caida_topology::as_graph::{ASGraph, ASNode, Attachment};
use caida_topology::shared::{LinkKind, Role};

#[test]
fn test_add_node_and_links() {
    let mut as_graph = ASGraph::new();

    as_graph.add_node(ASNode::switch(9));
    as_graph.add_link(1, 2, LinkKind::Direct);
    as_graph.add_link(2, 9, LinkKind::Indirect);

    assert_eq!(as_graph.len(), 3);
    assert_eq!(as_graph.link_count(), 2);
    assert_eq!(as_graph.get(&9).unwrap().role, Role::Switch);
    assert_eq!(as_graph.routers().count(), 2);
    assert_eq!(as_graph.switches().count(), 1);
    assert_eq!(as_graph.neighbors(&2).collect::<Vec<_>>(), vec![1, 9]);
    assert_eq!(as_graph.neighbors(&42).count(), 0);
}

#[test]
fn test_links_are_simple_and_undirected() {
    let mut as_graph = ASGraph::new();

    as_graph.add_link(5, 3, LinkKind::Indirect);
    as_graph.add_link(3, 5, LinkKind::Indirect);

    assert_eq!(as_graph.link_count(), 1);
    let link = as_graph.link(5, 3).unwrap();
    assert_eq!((link.a, link.b), (3, 5));
    assert_eq!(link.observations, 2);
    assert_eq!(link.kind, LinkKind::Indirect);
    assert_eq!(link.cost(), 1);
    assert_eq!(link.other(3), Some(5));
    assert_eq!(link.other(4), None);
}

#[test]
fn test_prefix_attachment() {
    let mut as_graph = ASGraph::new();
    as_graph.add_link(1, 2, LinkKind::Direct);
    let net = "192.0.2.0/24".parse().unwrap();

    assert!(as_graph.attach_prefix(1, net));
    assert!(!as_graph.attach_prefix(7, net));
    assert_eq!(as_graph.prefix_owner(&net), Some(1));

    let advertising: Vec<_> = as_graph.advertising_routers().map(|node| node.asn).collect();
    assert_eq!(advertising, vec![1]);
}

#[test]
fn test_rekey_interfaces() {
    let mut node = ASNode::new(1);
    for peer in [4, 7] {
        node.interfaces.push(caida_topology::Interface {
            name: format!("old{}", peer),
            attachment: Attachment::Peer(peer),
            address: None,
        });
    }

    node.rekey_interfaces();

    let names: Vec<_> = node.interfaces.iter().map(|iface| iface.name.as_str()).collect();
    assert_eq!(names, vec!["eth0", "eth1"]);
    assert_eq!(node.interface_to(7).unwrap().name, "eth1");
}

#[test]
fn test_graph_serializes_to_json() {
    let mut as_graph = ASGraph::new();
    as_graph.add_link(1, 2, LinkKind::Direct);
    as_graph.set_link_weight(1, 2, Some(5));

    let json = serde_json::to_string(&as_graph).unwrap();
    let back: ASGraph = serde_json::from_str(&json).unwrap();

    assert_eq!(back, as_graph);
    assert_eq!(back.link(1, 2).unwrap().weight, Some(5));
    assert!(back.has_weighted_links());
}
