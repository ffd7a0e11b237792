use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, VecDeque};
use std::ops::Bound::{Excluded, Unbounded};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::as_graph::{ASGraph, ASN};
use crate::error::UnknownEndpointError;
use crate::shared::{DataConsistencyWarning, Role, Warnings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneConfig {
    /// Threads used for the per-endpoint shortest path searches
    pub workers: usize,
    /// Use `PeerLink::weight` as edge cost instead of hop count
    pub use_link_weights: bool,
}

impl Default for PruneConfig {
    fn default() -> Self {
        PruneConfig {
            workers: num_cpus::get().max(1),
            use_link_weights: false,
        }
    }
}

impl PruneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_link_weights(mut self, enabled: bool) -> Self {
        self.use_link_weights = enabled;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub kept: BTreeSet<ASN>,
    pub removed: BTreeSet<ASN>,
    pub routers_removed: usize,
    pub switches_removed: usize,
    pub warnings: Vec<DataConsistencyWarning>,
}

/// Vertices on the chosen shortest paths out of a group of sources.
#[derive(Debug, Default)]
struct PathCover {
    vertices: BTreeSet<ASN>,
    unreachable: Vec<(ASN, ASN)>,
}

impl PathCover {
    fn merge(mut self, other: PathCover) -> PathCover {
        self.vertices.extend(other.vertices);
        self.unreachable.extend(other.unreachable);
        self
    }
}

/// Predecessor of every vertex reachable from the source.
type ShortestPathTree = BTreeMap<ASN, ASN>;

/// Breadth-first tree. Neighbors are expanded in ascending AS order and a
/// vertex keeps the first parent that reached it.
fn bfs_tree(graph: &ASGraph, source: ASN) -> ShortestPathTree {
    let mut parents = ShortestPathTree::new();
    let mut seen = BTreeSet::from([source]);
    let mut queue = VecDeque::from([source]);

    while let Some(current) = queue.pop_front() {
        for next in graph.neighbors(&current) {
            if seen.insert(next) {
                parents.insert(next, current);
                queue.push_back(next);
            }
        }
    }

    parents
}

/// Dijkstra tree over link costs. A parent is only replaced by a strictly
/// shorter route, so ties resolve to the first route found.
fn dijkstra_tree(graph: &ASGraph, source: ASN) -> ShortestPathTree {
    let mut parents = ShortestPathTree::new();
    let mut dist = BTreeMap::from([(source, 0u64)]);
    let mut heap = BinaryHeap::from([Reverse((0u64, source))]);

    while let Some(Reverse((d, current))) = heap.pop() {
        if dist.get(&current).map_or(false, |&best| d > best) {
            continue;
        }
        for next in graph.neighbors(&current) {
            let cost = graph.link(current, next).map_or(1, |link| link.cost());
            let candidate = d + cost;
            if dist.get(&next).map_or(true, |&best| candidate < best) {
                dist.insert(next, candidate);
                parents.insert(next, current);
                heap.push(Reverse((candidate, next)));
            }
        }
    }

    parents
}

/// Reduces a graph to the routers and switches on shortest paths between a
/// set of endpoints.
///
/// One shortest path is picked for every endpoint pair and every vertex on it
/// is kept. Everything else is deleted together with the interfaces, BGP
/// neighbor entries and prefix records that refer to it. Survivors keep their
/// own advertised networks.
#[derive(Debug, Clone, Default)]
pub struct RouterPruner {
    pub config: PruneConfig,
}

impl RouterPruner {
    pub fn new(config: PruneConfig) -> Self {
        RouterPruner { config }
    }

    fn tree(&self, graph: &ASGraph, source: ASN) -> ShortestPathTree {
        if self.config.use_link_weights {
            dijkstra_tree(graph, source)
        } else {
            bfs_tree(graph, source)
        }
    }

    /// Walks the tree of `source` back from every later endpoint.
    fn cover_from(&self, graph: &ASGraph, source: ASN, must_keep: &BTreeSet<ASN>) -> PathCover {
        let tree = self.tree(graph, source);
        let mut cover = PathCover::default();
        cover.vertices.insert(source);

        for &target in must_keep.range((Excluded(source), Unbounded)) {
            if !tree.contains_key(&target) {
                cover.unreachable.push((source, target));
                continue;
            }
            let mut current = target;
            while current != source {
                if !cover.vertices.insert(current) {
                    // Tree paths that meet share the rest of the way back
                    break;
                }
                match tree.get(&current) {
                    Some(&parent) => current = parent,
                    None => break,
                }
            }
        }

        cover
    }

    fn cover_all(&self, graph: &ASGraph, must_keep: &BTreeSet<ASN>) -> PathCover {
        let sources: Vec<ASN> = must_keep.iter().copied().collect();
        let run = || {
            sources
                .par_iter()
                .map(|&source| self.cover_from(graph, source, must_keep))
                .reduce(PathCover::default, PathCover::merge)
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(e) => {
                log::warn!("Unable to start prune workers, searching on one thread: {}", e);
                sources
                    .iter()
                    .map(|&source| self.cover_from(graph, source, must_keep))
                    .fold(PathCover::default(), PathCover::merge)
            }
        }
    }

    /// Every vertex that pruning for `must_keep` would keep.
    pub fn keep_set(
        &self,
        graph: &ASGraph,
        must_keep: &BTreeSet<ASN>,
    ) -> Result<(BTreeSet<ASN>, Vec<DataConsistencyWarning>), UnknownEndpointError> {
        if let Some(&missing) = must_keep.iter().find(|asn| !graph.contains(asn)) {
            return Err(UnknownEndpointError(missing));
        }

        log::debug!("Finding shortest paths between {} endpoints", must_keep.len());
        let cover = self.cover_all(graph, must_keep);

        let mut warnings = Warnings::new();
        let mut unreachable = cover.unreachable;
        unreachable.sort_unstable();
        for (a, b) in unreachable {
            warnings.push(DataConsistencyWarning::UnreachablePair { a, b });
        }

        Ok((cover.vertices, warnings.into_vec()))
    }

    /// Prunes `graph` in place.
    ///
    /// Fails without touching the graph if an endpoint is not a vertex.
    pub fn prune(
        &self,
        graph: &mut ASGraph,
        must_keep: &BTreeSet<ASN>,
    ) -> Result<PruneSummary, UnknownEndpointError> {
        let (kept, warnings) = self.keep_set(graph, must_keep)?;
        let removed: BTreeSet<ASN> = graph.asns().filter(|asn| !kept.contains(asn)).collect();

        let mut summary = PruneSummary {
            kept,
            warnings,
            ..PruneSummary::default()
        };

        log::debug!("Deleting {} vertices from graph", removed.len());
        let mut touched = BTreeSet::new();
        for &asn in &removed {
            if let Some(node) = graph.remove_vertex(asn) {
                match node.role {
                    Role::Router => summary.routers_removed += 1,
                    Role::Switch => summary.switches_removed += 1,
                }
                touched.extend(node.peers.iter().copied().filter(|peer| !removed.contains(peer)));
            }
        }
        log::info!(
            "Deleted {} routers and {} switches",
            summary.routers_removed,
            summary.switches_removed
        );

        log::debug!("Cleaning up interfaces and BGP neighbors on {} vertices", touched.len());
        for asn in &touched {
            let node = match graph.get_mut(asn) {
                Some(node) => node,
                None => continue,
            };

            let peers = &node.peers;
            node.interfaces
                .retain(|iface| iface.peer().map_or(true, |peer| peers.contains(&peer)));

            if let Some(bgp) = node.bgp.as_mut() {
                let router_as = bgp.router_as;
                bgp.neighbors
                    .retain(|&remote, _| remote != router_as && !removed.contains(&remote));
            }

            node.rekey_interfaces();
        }

        summary.removed = removed;
        Ok(summary)
    }
}

/// The first `count` routers that advertise at least one prefix, in AS order.
pub fn select_endpoints(graph: &ASGraph, count: usize) -> BTreeSet<ASN> {
    graph
        .advertising_routers()
        .take(count)
        .map(|node| node.asn)
        .collect()
}
