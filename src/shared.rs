use std::fmt;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::as_graph::ASN;

/// Address block the peer-facing interfaces are numbered from.
pub const DEFAULT_CONTROL_NETWORK: &str = "10.192.0.0/10";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Role {
    Router = 1,
    Switch = 2,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Router => "ROUTER",
            Role::Switch => "SWITCH",
        };
        write!(f, "{}", s)
    }
}

/// How a link was observed in the trace data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum LinkKind {
    Direct = 0,
    Indirect = 1,
}

impl LinkKind {
    /// A direct observation always wins over an indirect one.
    pub fn merge(self, other: LinkKind) -> LinkKind {
        if self == LinkKind::Direct || other == LinkKind::Direct {
            LinkKind::Direct
        } else {
            LinkKind::Indirect
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkKind::Direct => "DIRECT",
            LinkKind::Indirect => "INDIRECT",
        };
        write!(f, "{}", s)
    }
}

/// Non-fatal irregularities found while building or reducing a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataConsistencyWarning {
    /// The same AS pair was observed more than once and coalesced.
    DuplicateLink { a: ASN, b: ASN },
    /// A record expanded to a link from an AS to itself.
    SelfLink { asn: ASN },
    /// An AS appears in link data but owns no prefix.
    MissingPrefixes { asn: ASN },
    /// Two must-keep vertices have no path between them.
    UnreachablePair { a: ASN, b: ASN },
    /// An advertised network has no host address left for the router.
    UnplaceableNetwork { asn: ASN, network: IpNetwork },
    /// The control network ran out of addresses for peer interfaces.
    AddressPoolExhausted { asn: ASN, peer: ASN },
    /// Lenient prefix loading dropped a record.
    SkippedPrefixRecord { source_name: String, line: usize, reason: String },
}

impl fmt::Display for DataConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataConsistencyWarning::DuplicateLink { a, b } => {
                write!(f, "duplicate link AS{} <-> AS{} coalesced", a, b)
            }
            DataConsistencyWarning::SelfLink { asn } => {
                write!(f, "self link on AS{} ignored", asn)
            }
            DataConsistencyWarning::MissingPrefixes { asn } => {
                write!(f, "AS{} has links but no prefixes", asn)
            }
            DataConsistencyWarning::UnreachablePair { a, b } => {
                write!(f, "no path between AS{} and AS{}", a, b)
            }
            DataConsistencyWarning::UnplaceableNetwork { asn, network } => {
                write!(f, "unable to fit AS{} router on {}", asn, network)
            }
            DataConsistencyWarning::AddressPoolExhausted { asn, peer } => {
                write!(f, "no control address left for AS{} towards AS{}", asn, peer)
            }
            DataConsistencyWarning::SkippedPrefixRecord { source_name, line, reason } => {
                write!(f, "skipped prefix record {}:{}: {}", source_name, line, reason)
            }
        }
    }
}

/// Collects warnings for a stage and logs each one as it arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings {
    items: Vec<DataConsistencyWarning>,
}

impl Warnings {
    pub fn new() -> Self {
        Warnings { items: Vec::new() }
    }

    pub fn push(&mut self, warning: DataConsistencyWarning) {
        // Duplicates are routine in merged datasets, keep them out of the warn stream
        match warning {
            DataConsistencyWarning::DuplicateLink { .. }
            | DataConsistencyWarning::MissingPrefixes { .. } => log::debug!("{}", warning),
            _ => log::warn!("{}", warning),
        }
        self.items.push(warning);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataConsistencyWarning> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<DataConsistencyWarning> {
        self.items
    }
}

/// Splits an AS field into every AS it names.
///
/// CAIDA writes multi-origin groups as `X_Y` and AS sets as `X,Y`; both are
/// flattened in order. An optional `AS` prefix on each number is accepted.
pub fn parse_as_list(field: &str) -> Result<Vec<ASN>, String> {
    let mut ases = Vec::new();
    for group in field.split('_') {
        for token in group.split(',') {
            let token = token.trim();
            let digits = token
                .strip_prefix("AS")
                .or_else(|| token.strip_prefix("as"))
                .unwrap_or(token);
            let asn = digits
                .parse::<ASN>()
                .map_err(|e| format!("invalid AS number {:?}: {}", token, e))?;
            ases.push(asn);
        }
    }
    Ok(ases)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_as_list_moas_and_sets() {
        assert_eq!(parse_as_list("3356").unwrap(), vec![3356]);
        assert_eq!(parse_as_list("1_2").unwrap(), vec![1, 2]);
        assert_eq!(parse_as_list("1,2_3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_as_list("AS174").unwrap(), vec![174]);
        assert!(parse_as_list("12x").is_err());
        assert!(parse_as_list("").is_err());
    }

    #[test]
    fn test_link_kind_merge() {
        assert_eq!(LinkKind::Indirect.merge(LinkKind::Direct), LinkKind::Direct);
        assert_eq!(LinkKind::Indirect.merge(LinkKind::Indirect), LinkKind::Indirect);
    }
}
