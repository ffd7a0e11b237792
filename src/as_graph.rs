use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::shared::{LinkKind, Role};

pub type ASN = u32;

/// What the far side of an interface is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Attachment {
    /// Point-to-point side of a peer link
    Peer(ASN),
    /// LAN of one of the vertex's own advertised networks
    Network(IpNetwork),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub name: String,
    pub attachment: Attachment,
    /// Address plus netmask, `None` if no address could be assigned
    pub address: Option<IpNetwork>,
}

impl Interface {
    pub fn ip(&self) -> Option<IpAddr> {
        self.address.map(|net| net.ip())
    }

    pub fn peer(&self) -> Option<ASN> {
        match self.attachment {
            Attachment::Peer(asn) => Some(asn),
            Attachment::Network(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpNeighbor {
    pub remote_as: ASN,
    /// The neighbor's address on the shared link, used as next hop
    pub address: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpConfig {
    pub router_as: ASN,
    pub neighbors: BTreeMap<ASN, BgpNeighbor>,
    pub networks: BTreeSet<IpNetwork>,
}

impl BgpConfig {
    pub fn new(router_as: ASN) -> Self {
        BgpConfig {
            router_as,
            neighbors: BTreeMap::new(),
            networks: BTreeSet::new(),
        }
    }
}

/// Intra-domain routing state that may be left over from other tooling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OspfConfig {
    pub area: u32,
    pub networks: BTreeSet<IpNetwork>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ASNode {
    pub asn: ASN,
    pub role: Role,
    /// Blocks this AS owns according to the prefix data
    pub prefixes: BTreeSet<IpNetwork>,
    pub peers: BTreeSet<ASN>,
    pub interfaces: Vec<Interface>,
    pub bgp: Option<BgpConfig>,
    pub ospf: Option<OspfConfig>,
    pub bgp_over_ospf_redistribution: bool,
    pub ospf_over_bgp_redistribution: bool,
}

impl ASNode {
    pub fn new(asn: ASN) -> Self {
        ASNode {
            asn,
            role: Role::Router,
            prefixes: BTreeSet::new(),
            peers: BTreeSet::new(),
            interfaces: Vec::new(),
            bgp: None,
            ospf: None,
            bgp_over_ospf_redistribution: false,
            ospf_over_bgp_redistribution: false,
        }
    }

    pub fn switch(asn: ASN) -> Self {
        ASNode {
            role: Role::Switch,
            ..ASNode::new(asn)
        }
    }

    pub fn is_router(&self) -> bool {
        self.role == Role::Router
    }

    pub fn is_switch(&self) -> bool {
        self.role == Role::Switch
    }

    pub fn interface(&self, attachment: Attachment) -> Option<&Interface> {
        self.interfaces.iter().find(|iface| iface.attachment == attachment)
    }

    pub fn interface_to(&self, peer: ASN) -> Option<&Interface> {
        self.interface(Attachment::Peer(peer))
    }

    pub fn bgp_neighbor_count(&self) -> usize {
        self.bgp.as_ref().map(|bgp| bgp.neighbors.len()).unwrap_or(0)
    }

    pub fn bgp_network_count(&self) -> usize {
        self.bgp.as_ref().map(|bgp| bgp.networks.len()).unwrap_or(0)
    }

    pub fn has_legacy_routing(&self) -> bool {
        self.ospf.is_some()
            || self.bgp_over_ospf_redistribution
            || self.ospf_over_bgp_redistribution
    }

    /// Renames interfaces to a dense `eth0..ethN` sequence, keeping their order.
    pub fn rekey_interfaces(&mut self) {
        for (i, iface) in self.interfaces.iter_mut().enumerate() {
            iface.name = interface_name(i);
        }
    }
}

pub fn interface_name(index: usize) -> String {
    format!("eth{}", index)
}

/// Undirected link between two vertices. `a` is always the smaller AS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLink {
    pub a: ASN,
    pub b: ASN,
    pub weight: Option<u32>,
    pub kind: LinkKind,
    /// How many records reported this link
    pub observations: u32,
}

impl PeerLink {
    pub fn new(x: ASN, y: ASN, kind: LinkKind) -> Self {
        let (a, b) = ordered(x, y);
        PeerLink {
            a,
            b,
            weight: None,
            kind,
            observations: 1,
        }
    }

    pub fn key(&self) -> (ASN, ASN) {
        (self.a, self.b)
    }

    /// Cost for shortest-path purposes, 1 unless annotated.
    pub fn cost(&self) -> u64 {
        self.weight.map(u64::from).unwrap_or(1)
    }

    pub fn other(&self, asn: ASN) -> Option<ASN> {
        if asn == self.a {
            Some(self.b)
        } else if asn == self.b {
            Some(self.a)
        } else {
            None
        }
    }
}

fn ordered(x: ASN, y: ASN) -> (ASN, ASN) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUpdate {
    Created,
    /// The pair already had a link; its observation count was bumped
    Coalesced,
    SelfLoop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ASGraph {
    pub nodes: BTreeMap<ASN, ASNode>,
    #[serde(with = "link_list")]
    links: BTreeMap<(ASN, ASN), PeerLink>,
    /// Prefix ownership records attached to vertices
    pub prefixes: BTreeMap<IpNetwork, ASN>,
}

impl ASGraph {
    pub fn new() -> Self {
        ASGraph {
            nodes: BTreeMap::new(),
            links: BTreeMap::new(),
            prefixes: BTreeMap::new(),
        }
    }

    pub fn get(&self, asn: &ASN) -> Option<&ASNode> {
        self.nodes.get(asn)
    }

    pub fn get_mut(&mut self, asn: &ASN) -> Option<&mut ASNode> {
        self.nodes.get_mut(asn)
    }

    pub fn contains(&self, asn: &ASN) -> bool {
        self.nodes.contains_key(asn)
    }

    /// Inserts a vertex, replacing any vertex with the same AS number.
    pub fn add_node(&mut self, node: ASNode) -> Option<ASNode> {
        self.nodes.insert(node.asn, node)
    }

    /// Returns the vertex for `asn`, creating a router if it does not exist yet.
    pub fn ensure_node(&mut self, asn: ASN) -> &mut ASNode {
        self.nodes.entry(asn).or_insert_with(|| ASNode::new(asn))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ASNode> {
        self.nodes.values()
    }

    pub fn asns(&self) -> impl Iterator<Item = ASN> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn routers(&self) -> impl Iterator<Item = &ASNode> {
        self.nodes.values().filter(|node| node.is_router())
    }

    pub fn switches(&self) -> impl Iterator<Item = &ASNode> {
        self.nodes.values().filter(|node| node.is_switch())
    }

    /// Routers that own at least one prefix, in AS order.
    pub fn advertising_routers(&self) -> impl Iterator<Item = &ASNode> {
        self.routers().filter(|node| !node.prefixes.is_empty())
    }

    /// Router whose BGP identity is `asn`.
    pub fn find_router_by_as(&self, asn: ASN) -> Option<&ASNode> {
        self.routers()
            .find(|node| node.bgp.as_ref().map(|bgp| bgp.router_as) == Some(asn))
    }

    /// Neighbors of `asn` in ascending order.
    pub fn neighbors(&self, asn: &ASN) -> impl Iterator<Item = ASN> + '_ {
        self.nodes
            .get(asn)
            .into_iter()
            .flat_map(|node| node.peers.iter().copied())
    }

    /// Adds an undirected link, creating missing endpoints as routers.
    pub fn add_link(&mut self, x: ASN, y: ASN, kind: LinkKind) -> LinkUpdate {
        if x == y {
            return LinkUpdate::SelfLoop;
        }

        let key = ordered(x, y);
        if let Some(link) = self.links.get_mut(&key) {
            link.observations += 1;
            link.kind = link.kind.merge(kind);
            return LinkUpdate::Coalesced;
        }

        self.links.insert(key, PeerLink::new(x, y, kind));
        self.ensure_node(x).peers.insert(y);
        self.ensure_node(y).peers.insert(x);
        LinkUpdate::Created
    }

    pub fn link(&self, x: ASN, y: ASN) -> Option<&PeerLink> {
        self.links.get(&ordered(x, y))
    }

    pub fn set_link_weight(&mut self, x: ASN, y: ASN, weight: Option<u32>) -> bool {
        match self.links.get_mut(&ordered(x, y)) {
            Some(link) => {
                link.weight = weight;
                true
            }
            None => false,
        }
    }

    pub fn links(&self) -> impl Iterator<Item = &PeerLink> {
        self.links.values()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn has_weighted_links(&self) -> bool {
        self.links.values().any(|link| link.weight.is_some())
    }

    /// Records `network` as owned by `asn`. Returns false if the vertex is missing.
    pub fn attach_prefix(&mut self, asn: ASN, network: IpNetwork) -> bool {
        match self.nodes.get_mut(&asn) {
            Some(node) => {
                node.prefixes.insert(network);
                self.prefixes.insert(network, asn);
                true
            }
            None => false,
        }
    }

    pub fn prefix_owner(&self, network: &IpNetwork) -> Option<ASN> {
        self.prefixes.get(network).copied()
    }

    /// Deletes a vertex with everything it owns and every reference to it held
    /// by its neighbors: links, peer entries, BGP neighbor entries and the
    /// interfaces facing it. Neighbors keep their own advertised networks.
    pub fn remove_vertex(&mut self, asn: ASN) -> Option<ASNode> {
        let node = self.nodes.remove(&asn)?;

        for &peer in &node.peers {
            self.links.remove(&ordered(asn, peer));

            if let Some(neighbor) = self.nodes.get_mut(&peer) {
                neighbor.peers.remove(&asn);
                neighbor
                    .interfaces
                    .retain(|iface| iface.attachment != Attachment::Peer(asn));
                if let Some(bgp) = neighbor.bgp.as_mut() {
                    bgp.neighbors.remove(&asn);
                }
            }
        }

        for network in &node.prefixes {
            if self.prefixes.get(network) == Some(&asn) {
                self.prefixes.remove(network);
            }
        }

        Some(node)
    }
}

/// Serializes the link map as a plain list, since JSON keys must be strings.
mod link_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{PeerLink, ASN};

    pub fn serialize<S>(
        links: &BTreeMap<(ASN, ASN), PeerLink>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let list: Vec<&PeerLink> = links.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeMap<(ASN, ASN), PeerLink>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = Vec::<PeerLink>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|link| (link.key(), link)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_link_coalesces_both_directions() {
        let mut graph = ASGraph::new();

        assert_eq!(graph.add_link(2, 1, LinkKind::Indirect), LinkUpdate::Created);
        assert_eq!(graph.add_link(1, 2, LinkKind::Direct), LinkUpdate::Coalesced);
        assert_eq!(graph.add_link(3, 3, LinkKind::Direct), LinkUpdate::SelfLoop);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.link_count(), 1);
        let link = graph.link(2, 1).unwrap();
        assert_eq!(link.key(), (1, 2));
        assert_eq!(link.observations, 2);
        assert_eq!(link.kind, LinkKind::Direct);
    }

    #[test]
    fn test_remove_vertex_clears_references() {
        let mut graph = ASGraph::new();
        graph.add_link(1, 2, LinkKind::Direct);
        graph.add_link(2, 3, LinkKind::Direct);
        let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
        graph.attach_prefix(2, net);

        let node1 = graph.get_mut(&1).unwrap();
        node1.interfaces.push(Interface {
            name: interface_name(0),
            attachment: Attachment::Peer(2),
            address: None,
        });
        let mut bgp = BgpConfig::new(1);
        bgp.neighbors.insert(2, BgpNeighbor { remote_as: 2, address: None });
        node1.bgp = Some(bgp);

        let removed = graph.remove_vertex(2).unwrap();
        assert_eq!(removed.asn, 2);
        assert!(graph.remove_vertex(2).is_none());

        assert_eq!(graph.link_count(), 0);
        assert_eq!(graph.prefix_owner(&net), None);
        let node1 = graph.get(&1).unwrap();
        assert!(node1.peers.is_empty());
        assert!(node1.interfaces.is_empty());
        assert_eq!(node1.bgp_neighbor_count(), 0);
        assert!(graph.get(&3).unwrap().peers.is_empty());
    }
}
