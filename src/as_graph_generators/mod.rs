pub mod caida;

use std::io::BufRead;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::as_graph::ASGraph;
use crate::error::TopologyError;
use crate::prefix_table::{read_prefix_records, PrefixTable};
use crate::shared::{DataConsistencyWarning, Warnings};

pub use caida::{parse_link_record, read_links, InputSource, LinkRecord};

pub trait ASGraphGenerator {
    fn generate(&self) -> Result<ParsedTopology, TopologyError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseConfig {
    /// Skip malformed pfx2as records with a warning instead of failing
    pub lenient_prefixes: bool,
}

impl ParseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lenient_prefixes(mut self, lenient: bool) -> Self {
        self.lenient_prefixes = lenient;
        self
    }
}

/// A freshly parsed AS graph and everything odd noticed while building it.
#[derive(Debug)]
pub struct ParsedTopology {
    pub graph: ASGraph,
    pub prefix_table: PrefixTable,
    pub warnings: Vec<DataConsistencyWarning>,
}

/// Builds an AS graph from AS-link and pfx2as sources.
#[derive(Debug, Clone, Default)]
pub struct TopologyParser {
    pub config: ParseConfig,
}

impl TopologyParser {
    pub fn new(config: ParseConfig) -> Self {
        TopologyParser { config }
    }

    /// Reads all link sources, then all prefix sources, and attaches to every
    /// AS each block the prefix table assigns to it.
    ///
    /// Link sources are merged into one graph; a pair seen in several sources
    /// becomes one link. Prefix sources are loaded in the given order, so a
    /// later record for the same block replaces an earlier one.
    pub fn parse<L, P>(
        &self,
        links: Vec<InputSource<L>>,
        prefixes: Vec<InputSource<P>>,
    ) -> Result<ParsedTopology, TopologyError>
    where
        L: BufRead,
        P: BufRead,
    {
        let mut graph = ASGraph::new();
        let mut warnings = Warnings::new();

        log::debug!("Generate AS links");
        for source in links {
            read_links(source, &mut graph, &mut warnings)?;
        }

        log::debug!("Build prefix table");
        let mut records = Vec::new();
        for source in prefixes {
            let InputSource { name, reader } = source;
            let lenient = if self.config.lenient_prefixes {
                Some(&mut warnings)
            } else {
                None
            };
            records.extend(read_prefix_records(&name, reader, lenient)?);
        }
        let prefix_table = PrefixTable::build(records);

        log::debug!("Assign BGP networks");
        let mut unlinked = 0usize;
        for (network, owner) in prefix_table.entries() {
            if !graph.attach_prefix(owner, network) {
                unlinked += 1;
            }
        }
        if unlinked > 0 {
            log::debug!("{} prefixes belong to ASes without links", unlinked);
        }

        let bare: Vec<_> = graph
            .iter()
            .filter(|node| node.prefixes.is_empty())
            .map(|node| node.asn)
            .collect();
        for asn in bare {
            warnings.push(DataConsistencyWarning::MissingPrefixes { asn });
        }

        log::info!(
            "Parsed {} ASes, {} links, {} prefixes ({} warnings)",
            graph.len(),
            graph.link_count(),
            graph.prefixes.len(),
            warnings.len()
        );

        Ok(ParsedTopology {
            graph,
            prefix_table,
            warnings: warnings.into_vec(),
        })
    }

    pub fn parse_files(
        &self,
        aslinks: &[PathBuf],
        pfx2as: &[PathBuf],
    ) -> Result<ParsedTopology, TopologyError> {
        let links = aslinks
            .iter()
            .map(|path| InputSource::open(path))
            .collect::<Result<Vec<_>, _>>()?;
        let prefixes = pfx2as
            .iter()
            .map(|path| InputSource::open(path))
            .collect::<Result<Vec<_>, _>>()?;
        self.parse(links, prefixes)
    }
}

/// Generator over on-disk CAIDA files.
#[derive(Debug, Clone, Default)]
pub struct CAIDAGraphGenerator {
    pub aslinks: Vec<PathBuf>,
    pub pfx2as: Vec<PathBuf>,
    pub config: ParseConfig,
}

impl CAIDAGraphGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aslinks(mut self, path: impl Into<PathBuf>) -> Self {
        self.aslinks.push(path.into());
        self
    }

    pub fn with_pfx2as(mut self, path: impl Into<PathBuf>) -> Self {
        self.pfx2as.push(path.into());
        self
    }

    pub fn with_config(mut self, config: ParseConfig) -> Self {
        self.config = config;
        self
    }
}

impl ASGraphGenerator for CAIDAGraphGenerator {
    fn generate(&self) -> Result<ParsedTopology, TopologyError> {
        TopologyParser::new(self.config.clone()).parse_files(&self.aslinks, &self.pfx2as)
    }
}
