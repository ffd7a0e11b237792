use std::collections::{BTreeMap, BTreeSet, VecDeque};

use caida_topology::as_graph::{ASGraph, ASNode, Attachment, ASN};
use caida_topology::error::UnknownEndpointError;
use caida_topology::pruner::{select_endpoints, PruneConfig, RouterPruner};
use caida_topology::shared::{DataConsistencyWarning, LinkKind};
use caida_topology::{annotate, prune};
use ipnetwork::IpNetwork;

fn graph_from(links: &[(ASN, ASN)]) -> ASGraph {
    let mut graph = ASGraph::new();
    for &(a, b) in links {
        graph.add_link(a, b, LinkKind::Direct);
    }
    graph
}

/// Five vertices in a ring: 1-2-3-4-5-1
fn ring() -> ASGraph {
    graph_from(&[(1, 2), (2, 3), (3, 4), (4, 5), (1, 5)])
}

fn hop_distances(graph: &ASGraph, source: ASN) -> BTreeMap<ASN, usize> {
    let mut dist = BTreeMap::from([(source, 0)]);
    let mut queue = VecDeque::from([source]);
    while let Some(current) = queue.pop_front() {
        let d = dist[&current];
        for next in graph.neighbors(&current) {
            if !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}

#[test]
fn test_prune_ring_example() {
    let mut graph = annotate(ring());
    let must_keep = BTreeSet::from([1, 4]);

    let summary = RouterPruner::default().prune(&mut graph, &must_keep).unwrap();

    assert_eq!(summary.kept, BTreeSet::from([1, 4, 5]));
    assert_eq!(summary.removed, BTreeSet::from([2, 3]));
    assert_eq!(summary.routers_removed, 2);
    assert_eq!(summary.switches_removed, 0);
    assert!(summary.warnings.is_empty());

    assert_eq!(graph.asns().collect::<Vec<_>>(), vec![1, 4, 5]);
    assert_eq!(graph.link_count(), 2);

    let node1 = graph.get(&1).unwrap();
    assert_eq!(node1.peers, BTreeSet::from([5]));
    assert!(node1.interface_to(2).is_none());
    let sessions: Vec<_> = node1.bgp.as_ref().unwrap().neighbors.keys().copied().collect();
    assert_eq!(sessions, vec![5]);
    assert_eq!(node1.interfaces.len(), 1);
    assert_eq!(node1.interfaces[0].name, "eth0");

    let node4 = graph.get(&4).unwrap();
    assert!(node4.interface_to(3).is_none());
    assert_eq!(node4.bgp_neighbor_count(), 1);
}

#[test]
fn test_keep_everything_is_a_no_op() {
    let original = annotate(ring());
    let all: BTreeSet<ASN> = original.asns().collect();

    let pruned = prune(original.clone(), &all).unwrap();

    assert_eq!(pruned, original);
}

#[test]
fn test_unknown_endpoint_leaves_graph_alone() {
    let mut graph = ring();
    let before = graph.clone();

    let err = RouterPruner::default()
        .prune(&mut graph, &BTreeSet::from([1, 42]))
        .unwrap_err();

    assert_eq!(err, UnknownEndpointError(42));
    assert_eq!(graph, before);
}

#[test]
fn test_unreachable_pair_is_a_warning() {
    let mut graph = graph_from(&[(1, 2), (2, 3), (10, 11), (11, 12)]);

    let summary = RouterPruner::default()
        .prune(&mut graph, &BTreeSet::from([1, 3, 12]))
        .unwrap();

    assert_eq!(summary.kept, BTreeSet::from([1, 2, 3, 12]));
    assert_eq!(
        summary.warnings,
        vec![
            DataConsistencyWarning::UnreachablePair { a: 1, b: 12 },
            DataConsistencyWarning::UnreachablePair { a: 3, b: 12 },
        ]
    );
    assert!(graph.get(&12).unwrap().peers.is_empty());
}

#[test]
fn test_distances_between_endpoints_survive() {
    // A 4x4 grid with a few shortcuts
    let mut links = Vec::new();
    for row in 0..4u32 {
        for col in 0..4u32 {
            let asn = row * 4 + col + 1;
            if col < 3 {
                links.push((asn, asn + 1));
            }
            if row < 3 {
                links.push((asn, asn + 4));
            }
        }
    }
    links.extend([(1, 6), (7, 16), (4, 13)]);
    let graph = graph_from(&links);
    let must_keep = BTreeSet::from([1, 8, 14, 16]);

    let pruner = RouterPruner::new(PruneConfig::new().with_workers(3));
    let mut pruned = graph.clone();
    let summary = pruner.prune(&mut pruned, &must_keep).unwrap();

    assert!(summary.kept.is_superset(&must_keep));
    assert!(pruned.len() < graph.len());
    for &u in &must_keep {
        let before = hop_distances(&graph, u);
        let after = hop_distances(&pruned, u);
        for &v in &must_keep {
            assert_eq!(after.get(&v), before.get(&v), "distance {} -> {}", u, v);
        }
    }
}

#[test]
fn test_prune_is_deterministic() {
    let must_keep = BTreeSet::from([1, 3]);
    let diamond = graph_from(&[(1, 2), (1, 4), (2, 3), (4, 3)]);

    let first = prune(diamond.clone(), &must_keep).unwrap();
    let second = RouterPruner::new(PruneConfig::new().with_workers(1))
        .prune(&mut diamond.clone(), &must_keep)
        .unwrap();

    assert_eq!(first.asns().collect::<Vec<_>>(), vec![1, 2, 3]);
    assert_eq!(second.kept, BTreeSet::from([1, 2, 3]));
}

#[test]
fn test_weighted_pruning() {
    let mut graph = ring();
    graph.set_link_weight(1, 5, Some(10));
    graph.set_link_weight(4, 5, Some(10));
    let must_keep = BTreeSet::from([1, 4]);

    let unweighted = RouterPruner::default().keep_set(&graph, &must_keep).unwrap().0;
    let weighted = RouterPruner::new(PruneConfig::new().with_link_weights(true))
        .keep_set(&graph, &must_keep)
        .unwrap()
        .0;

    assert_eq!(unweighted, BTreeSet::from([1, 4, 5]));
    assert_eq!(weighted, BTreeSet::from([1, 2, 3, 4]));
}

#[test]
fn test_removed_prefixes_and_switches() {
    let mut graph = ring();
    graph.add_node(ASNode::switch(60));
    graph.add_link(3, 60, LinkKind::Direct);
    let net2: IpNetwork = "198.51.100.0/24".parse().unwrap();
    let net5: IpNetwork = "203.0.113.0/24".parse().unwrap();
    graph.attach_prefix(2, net2);
    graph.attach_prefix(5, net5);
    let mut graph = annotate(graph);
    let node5_before = graph.get(&5).unwrap().clone();
    assert_eq!(node5_before.bgp_network_count(), 1);

    let summary = RouterPruner::default()
        .prune(&mut graph, &BTreeSet::from([1, 4]))
        .unwrap();

    assert_eq!(summary.routers_removed, 2);
    assert_eq!(summary.switches_removed, 1);
    assert_eq!(graph.prefix_owner(&net2), None);
    assert_eq!(graph.prefix_owner(&net5), Some(5));

    // Survivors keep their own advertisements
    let node5 = graph.get(&5).unwrap();
    assert_eq!(node5.bgp_network_count(), 1);
    assert_eq!(node5.bgp, node5_before.bgp);
    assert!(node5.interface(Attachment::Network(net5)).is_some());
    assert!(graph.get(&1).unwrap().bgp.as_ref().unwrap().networks.is_empty());
}

#[test]
fn test_select_endpoints() {
    let mut graph = ring();
    graph.add_node(ASNode::switch(0));
    let prefixes = [
        (0, "192.0.2.0/24"),
        (4, "10.4.0.0/16"),
        (2, "10.2.0.0/16"),
        (5, "10.5.0.0/16"),
    ];
    for (asn, prefix) in prefixes {
        graph.attach_prefix(asn, prefix.parse().unwrap());
    }

    assert_eq!(select_endpoints(&graph, 2), BTreeSet::from([2, 4]));
    assert_eq!(select_endpoints(&graph, 10), BTreeSet::from([2, 4, 5]));
    assert!(select_endpoints(&graph, 0).is_empty());
}
