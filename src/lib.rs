// Re-export all public modules
pub mod shared;
pub mod error;
pub mod as_graph;
pub mod prefix_table;
pub mod as_graph_generators;
pub mod annotator;
pub mod pruner;

use std::collections::BTreeSet;
use std::io::BufRead;
use std::path::PathBuf;

// Re-export commonly used types at the crate root
pub use annotator::{AnnotateConfig, AnnotationSummary, BGPAnnotator};
pub use as_graph::{ASGraph, ASNode, Attachment, BgpConfig, BgpNeighbor, Interface, PeerLink, ASN};
pub use as_graph_generators::{
    ASGraphGenerator, CAIDAGraphGenerator, InputSource, ParseConfig, ParsedTopology, TopologyParser,
};
pub use error::{Error, MalformedPrefixError, TopologyError, UnknownEndpointError};
pub use prefix_table::PrefixTable;
pub use pruner::{select_endpoints, PruneConfig, PruneSummary, RouterPruner};
pub use shared::{DataConsistencyWarning, LinkKind, Role};

/// Builds an AS graph from in-memory sources with the default parser settings.
pub fn parse<L, P>(
    links: Vec<InputSource<L>>,
    prefixes: Vec<InputSource<P>>,
) -> Result<ParsedTopology, TopologyError>
where
    L: BufRead,
    P: BufRead,
{
    TopologyParser::default().parse(links, prefixes)
}

/// Builds an AS graph from aslinks and pfx2as files (plain or `.bz2`).
pub fn parse_files(
    aslinks: &[PathBuf],
    pfx2as: &[PathBuf],
) -> Result<ParsedTopology, TopologyError> {
    TopologyParser::default().parse_files(aslinks, pfx2as)
}

/// Annotates `graph` with the default settings and hands it back.
///
/// Warnings are only logged here. Callers that need them should use
/// [`BGPAnnotator::annotate`], which returns them in its [`AnnotationSummary`].
pub fn annotate(mut graph: ASGraph) -> ASGraph {
    BGPAnnotator::default().annotate(&mut graph);
    graph
}

/// Prunes `graph` down to the shortest paths between `must_keep`.
///
/// Unreachable endpoint pairs are only logged here. Callers that need them
/// should use [`RouterPruner::prune`], which returns them in its [`PruneSummary`].
pub fn prune(
    mut graph: ASGraph,
    must_keep: &BTreeSet<ASN>,
) -> Result<ASGraph, UnknownEndpointError> {
    RouterPruner::default().prune(&mut graph, must_keep)?;
    Ok(graph)
}
