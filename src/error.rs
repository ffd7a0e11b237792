//! Error types for the parse, annotate and prune stages.

use thiserror::Error;

use crate::as_graph::ASN;

/// A pfx2as record that could not be turned into a prefix and an owner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Malformed prefix record at {source_name}:{line} ({reason}): {content:?}")]
pub struct MalformedPrefixError {
    pub source_name: String,
    /// 1-based line number inside the source
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// Pruning was asked to keep a vertex the graph does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Unknown endpoint: AS{0} is not in the graph")]
pub struct UnknownEndpointError(pub ASN);

/// Fatal errors while reading topology inputs.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Reading a named input failed
    #[error("Cannot read {source_name}: {source}")]
    Io {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
    /// An AS-link line could not be understood
    #[error("Malformed link record at {source_name}:{line}: {content:?}")]
    MalformedLink {
        source_name: String,
        line: usize,
        content: String,
    },
    /// A pfx2as line could not be understood
    #[error(transparent)]
    MalformedPrefix(#[from] MalformedPrefixError),
}

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("Topology Error: {0}")]
    Topology(#[from] TopologyError),
    #[error("Prune Error: {0}")]
    UnknownEndpoint(#[from] UnknownEndpointError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<MalformedPrefixError> for Error {
    fn from(cause: MalformedPrefixError) -> Self {
        Self::Topology(TopologyError::MalformedPrefix(cause))
    }
}
