use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv4Network};
use serde::{Deserialize, Serialize};

use crate::as_graph::{
    interface_name, ASGraph, ASNode, Attachment, BgpConfig, BgpNeighbor, Interface, ASN,
};
use crate::shared::{DataConsistencyWarning, Warnings, DEFAULT_CONTROL_NETWORK};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotateConfig {
    /// Pool the peer-facing interfaces are addressed from
    pub control_network: Ipv4Network,
    /// Give every advertised prefix its own LAN-facing interface
    pub network_interfaces: bool,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        AnnotateConfig {
            control_network: default_control_network(),
            network_interfaces: true,
        }
    }
}

impl AnnotateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_control_network(mut self, network: Ipv4Network) -> Self {
        self.control_network = network;
        self
    }

    pub fn with_network_interfaces(mut self, enabled: bool) -> Self {
        self.network_interfaces = enabled;
        self
    }
}

fn default_control_network() -> Ipv4Network {
    DEFAULT_CONTROL_NETWORK
        .parse()
        .unwrap_or_else(|_| Ipv4Network::from(Ipv4Addr::new(10, 192, 0, 0)))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub routers: usize,
    pub switches: usize,
    /// BGP neighbor entries across all routers
    pub neighbors: usize,
    /// BGP network advertisements across all routers
    pub networks: usize,
    /// Vertices that carried OSPF or redistribution state
    pub stripped_legacy: usize,
    pub warnings: Vec<DataConsistencyWarning>,
}

/// Hands out host addresses of a network in ascending order, skipping any
/// address already taken.
struct AddressPool {
    prefix: u8,
    next: u64,
    end: u64,
    used: BTreeSet<Ipv4Addr>,
}

impl AddressPool {
    fn new(network: Ipv4Network, used: BTreeSet<Ipv4Addr>) -> Self {
        let first = u64::from(u32::from(network.network())) + 1;
        let broadcast = u64::from(u32::from(network.broadcast()));
        AddressPool {
            prefix: network.prefix(),
            next: first,
            end: broadcast.max(first),
            used,
        }
    }

    fn allocate(&mut self) -> Option<IpNetwork> {
        while self.next < self.end {
            let addr = Ipv4Addr::from(self.next as u32);
            self.next += 1;
            if self.used.insert(addr) {
                return Ipv4Network::new(addr, self.prefix).ok().map(IpNetwork::V4);
            }
        }
        None
    }
}

/// First usable host of `network` with the network's own mask, if it has one.
pub fn first_host(network: &IpNetwork) -> Option<IpNetwork> {
    let host = match network.network() {
        IpAddr::V4(addr) if network.prefix() <= 30 => {
            IpAddr::V4(Ipv4Addr::from(u32::from(addr) + 1))
        }
        IpAddr::V6(addr) if network.prefix() <= 126 => {
            IpAddr::V6(Ipv6Addr::from(u128::from(addr) + 1))
        }
        _ => return None,
    };
    IpNetwork::new(host, network.prefix()).ok()
}

/// Decorates a parsed AS graph with routers, interfaces and BGP sessions.
///
/// Every link gets one interface on each side, addressed from the control
/// network; every router gets a BGP neighbor per adjacent router and
/// advertises the prefixes of its AS. OSPF and redistribution state found on
/// a vertex is dropped. Running it again over its own output changes nothing.
#[derive(Debug, Clone, Default)]
pub struct BGPAnnotator {
    pub config: AnnotateConfig,
}

impl BGPAnnotator {
    pub fn new(config: AnnotateConfig) -> Self {
        BGPAnnotator { config }
    }

    pub fn annotate(&self, graph: &mut ASGraph) -> AnnotationSummary {
        let mut warnings = Warnings::new();

        log::debug!("Assign peer interfaces");
        self.assign_peer_interfaces(graph, &mut warnings);

        if self.config.network_interfaces {
            log::debug!("Assign network interfaces");
            for node in graph.nodes.values_mut() {
                assign_network_interfaces(node, &mut warnings);
            }
        }

        log::debug!("Configure BGP");
        let sessions = collect_sessions(graph);
        let mut summary = AnnotationSummary::default();

        for (asn, node) in graph.nodes.iter_mut() {
            if node.has_legacy_routing() {
                summary.stripped_legacy += 1;
            }
            node.ospf = None;
            node.bgp_over_ospf_redistribution = false;
            node.ospf_over_bgp_redistribution = false;

            node.rekey_interfaces();

            if node.is_switch() {
                node.bgp = None;
                summary.switches += 1;
                continue;
            }

            let bgp = node.bgp.get_or_insert_with(|| BgpConfig::new(*asn));
            bgp.router_as = *asn;
            bgp.neighbors = sessions.get(asn).cloned().unwrap_or_default();
            bgp.networks = node.prefixes.clone();

            summary.routers += 1;
            summary.neighbors += bgp.neighbors.len();
            summary.networks += bgp.networks.len();
        }

        if summary.stripped_legacy > 0 {
            log::debug!("Stripped OSPF info from {} vertices", summary.stripped_legacy);
        }
        log::info!(
            "Annotated {} routers and {} switches: {} BGP neighbors, {} networks",
            summary.routers,
            summary.switches,
            summary.neighbors,
            summary.networks
        );

        summary.warnings = warnings.into_vec();
        summary
    }

    fn assign_peer_interfaces(&self, graph: &mut ASGraph, warnings: &mut Warnings) {
        let control = self.config.control_network;

        // Drop interfaces facing vertices that are no longer peers
        for node in graph.nodes.values_mut() {
            let peers = &node.peers;
            node.interfaces.retain(|iface| match iface.attachment {
                Attachment::Peer(peer) => peers.contains(&peer),
                Attachment::Network(_) => true,
            });
        }

        let mut used: BTreeSet<Ipv4Addr> = graph
            .iter()
            .flat_map(|node| node.interfaces.iter())
            .filter_map(|iface| match iface.ip() {
                Some(IpAddr::V4(addr)) if control.contains(addr) => Some(addr),
                _ => None,
            })
            .collect();

        // LAN interfaces come later and always take their network's first host
        if self.config.network_interfaces {
            let lan_hosts = graph
                .iter()
                .flat_map(|node| node.prefixes.iter())
                .filter_map(first_host)
                .filter_map(|host| match host.ip() {
                    IpAddr::V4(addr) if control.contains(addr) => Some(addr),
                    _ => None,
                });
            used.extend(lan_hosts);
        }
        let mut pool = AddressPool::new(control, used);

        let pairs: Vec<(ASN, ASN)> = graph.links().map(|link| link.key()).collect();
        for (a, b) in pairs {
            for (local, remote) in [(a, b), (b, a)] {
                if let Some(node) = graph.get_mut(&local) {
                    ensure_interface(node, Attachment::Peer(remote), || {
                        let address = pool.allocate();
                        if address.is_none() {
                            warnings.push(DataConsistencyWarning::AddressPoolExhausted {
                                asn: local,
                                peer: remote,
                            });
                        }
                        address
                    });
                }
            }
        }
    }
}

/// Makes sure `node` has an addressed interface for `attachment`, calling
/// `address` only when a new address is needed.
fn ensure_interface<F>(node: &mut ASNode, attachment: Attachment, address: F)
where
    F: FnOnce() -> Option<IpNetwork>,
{
    match node.interfaces.iter_mut().find(|iface| iface.attachment == attachment) {
        Some(iface) if iface.address.is_some() => {}
        Some(iface) => iface.address = address(),
        None => {
            let name = interface_name(node.interfaces.len());
            node.interfaces.push(Interface {
                name,
                attachment,
                address: address(),
            });
        }
    }
}

fn assign_network_interfaces(node: &mut ASNode, warnings: &mut Warnings) {
    let prefixes = &node.prefixes;
    node.interfaces.retain(|iface| match iface.attachment {
        Attachment::Network(network) => prefixes.contains(&network),
        Attachment::Peer(_) => true,
    });

    let prefixes: Vec<IpNetwork> = node.prefixes.iter().copied().collect();
    for network in prefixes {
        let attachment = Attachment::Network(network);
        if node.interface(attachment).is_some() {
            continue;
        }
        match first_host(&network) {
            Some(address) => ensure_interface(node, attachment, || Some(address)),
            None => warnings.push(DataConsistencyWarning::UnplaceableNetwork {
                asn: node.asn,
                network,
            }),
        }
    }
}

/// BGP neighbor entries for every router, keyed by router AS.
///
/// A neighbor's address is the far side's interface on the shared link, which
/// is the next hop for routes learned over that session.
fn collect_sessions(graph: &ASGraph) -> BTreeMap<ASN, BTreeMap<ASN, BgpNeighbor>> {
    let mut sessions = BTreeMap::new();

    for node in graph.routers() {
        let mut neighbors = BTreeMap::new();
        for &peer in &node.peers {
            if peer == node.asn {
                continue;
            }
            let remote = match graph.get(&peer) {
                Some(remote) if remote.is_router() => remote,
                _ => continue,
            };
            neighbors.insert(
                peer,
                BgpNeighbor {
                    remote_as: peer,
                    address: remote.interface_to(node.asn).and_then(Interface::ip),
                },
            );
        }
        sessions.insert(node.asn, neighbors);
    }

    sessions
}
