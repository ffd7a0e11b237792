use std::fmt;
use std::io::BufRead;
use std::marker::PhantomData;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};

use crate::as_graph::ASN;
use crate::error::MalformedPrefixError;
use crate::shared::{parse_as_list, DataConsistencyWarning, Warnings};

/// An address family the trie can be keyed by.
///
/// Addresses are handled as right-aligned integers of `BITS` width; bit 0 is the
/// most significant bit of the address.
pub trait AddressFamily: Copy + fmt::Debug {
    const BITS: u8;

    fn to_bits(self) -> u128;
    fn from_bits(bits: u128) -> Self;
    fn network(addr: Self, prefix_len: u8) -> Option<IpNetwork>;

    fn bit(self, index: u8) -> bool {
        (self.to_bits() >> (Self::BITS - 1 - index)) & 1 == 1
    }
}

impl AddressFamily for Ipv4Addr {
    const BITS: u8 = 32;

    fn to_bits(self) -> u128 {
        u32::from(self) as u128
    }

    fn from_bits(bits: u128) -> Self {
        Ipv4Addr::from(bits as u32)
    }

    fn network(addr: Self, prefix_len: u8) -> Option<IpNetwork> {
        Ipv4Network::new(addr, prefix_len).ok().map(IpNetwork::V4)
    }
}

impl AddressFamily for Ipv6Addr {
    const BITS: u8 = 128;

    fn to_bits(self) -> u128 {
        u128::from(self)
    }

    fn from_bits(bits: u128) -> Self {
        Ipv6Addr::from(bits)
    }

    fn network(addr: Self, prefix_len: u8) -> Option<IpNetwork> {
        Ipv6Network::new(addr, prefix_len).ok().map(IpNetwork::V6)
    }
}

#[derive(Debug, Default)]
struct PrefixNode {
    /// Set when a prefix ends exactly at this node
    asn: Option<ASN>,
    left: Option<Box<PrefixNode>>,
    right: Option<Box<PrefixNode>>,
}

impl PrefixNode {
    fn child(&self, bit: bool) -> Option<&PrefixNode> {
        if bit {
            self.right.as_deref()
        } else {
            self.left.as_deref()
        }
    }
}

/// Binary trie over one address family.
#[derive(Debug)]
pub struct PrefixTrie<A: AddressFamily> {
    root: PrefixNode,
    len: usize,
    _family: PhantomData<A>,
}

impl<A: AddressFamily> PrefixTrie<A> {
    fn new() -> Self {
        PrefixTrie {
            root: PrefixNode::default(),
            len: 0,
            _family: PhantomData,
        }
    }

    /// Marks `addr/prefix_len` as owned by `asn`. A later insert of the same
    /// prefix overwrites the earlier owner and returns it.
    fn insert(&mut self, addr: A, prefix_len: u8, asn: ASN) -> Option<ASN> {
        let mut node = &mut self.root;
        for index in 0..prefix_len {
            let child = if addr.bit(index) {
                &mut node.right
            } else {
                &mut node.left
            };
            node = child.get_or_insert_with(Box::default).as_mut();
        }

        let previous = node.asn.replace(asn);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Deepest marked prefix covering `addr`, looking at most `max_len` bits deep.
    fn longest_match(&self, addr: A, max_len: u8) -> Option<(u8, ASN)> {
        let mut best = self.root.asn.map(|asn| (0, asn));
        let mut node = &self.root;

        for index in 0..max_len.min(A::BITS) {
            match node.child(addr.bit(index)) {
                Some(child) => {
                    node = child;
                    if let Some(asn) = node.asn {
                        best = Some((index + 1, asn));
                    }
                }
                None => break,
            }
        }

        best
    }

    fn exact(&self, addr: A, prefix_len: u8) -> Option<ASN> {
        let mut node = &self.root;
        for index in 0..prefix_len {
            node = node.child(addr.bit(index))?;
        }
        node.asn
    }

    /// Every stored prefix, shorter prefixes first along each branch and the
    /// zero branch before the one branch.
    fn entries(&self) -> Vec<(IpNetwork, ASN)> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack: Vec<(&PrefixNode, u128, u8)> = vec![(&self.root, 0, 0)];

        while let Some((node, bits, depth)) = stack.pop() {
            if let Some(asn) = node.asn {
                if let Some(network) = A::network(A::from_bits(bits), depth) {
                    out.push((network, asn));
                }
            }
            // Push right first so left is visited first
            if let Some(right) = node.right.as_deref() {
                let bits = bits | (1u128 << (A::BITS - 1 - depth));
                stack.push((right, bits, depth + 1));
            }
            if let Some(left) = node.left.as_deref() {
                stack.push((left, bits, depth + 1));
            }
        }

        out
    }
}

/// Longest-prefix-match index from IPv4 and IPv6 blocks to their owning AS.
///
/// Built once with [`PrefixTable::build`] and read-only afterwards, so it can
/// be shared between threads for concurrent lookups. When the same block is
/// loaded twice the later entry wins.
#[derive(Debug)]
pub struct PrefixTable {
    v4: PrefixTrie<Ipv4Addr>,
    v6: PrefixTrie<Ipv6Addr>,
}

impl PrefixTable {
    pub fn build<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (IpNetwork, ASN)>,
    {
        let mut table = PrefixTable {
            v4: PrefixTrie::new(),
            v6: PrefixTrie::new(),
        };

        let mut overwritten = 0usize;
        for (prefix, asn) in entries {
            let previous = match prefix.network() {
                IpAddr::V4(addr) => table.v4.insert(addr, prefix.prefix(), asn),
                IpAddr::V6(addr) => table.v6.insert(addr, prefix.prefix(), asn),
            };
            if previous.is_some() {
                overwritten += 1;
            }
        }

        log::debug!(
            "Built prefix table: {} IPv4 and {} IPv6 prefixes ({} overwritten)",
            table.v4.len,
            table.v6.len,
            overwritten
        );
        table
    }

    /// Reads pfx2as records and builds the table from them.
    pub fn from_reader<R: BufRead>(
        source_name: &str,
        reader: R,
    ) -> Result<Self, MalformedPrefixError> {
        let entries = read_prefix_records(source_name, reader, None)?;
        Ok(Self::build(entries))
    }

    /// AS owning the most specific prefix that covers `addr`.
    pub fn lookup(&self, addr: IpAddr) -> Option<ASN> {
        self.longest_match(addr).map(|(_, asn)| asn)
    }

    pub fn longest_match(&self, addr: IpAddr) -> Option<(IpNetwork, ASN)> {
        match addr {
            IpAddr::V4(addr) => self
                .v4
                .longest_match(addr, u8::MAX)
                .and_then(|(len, asn)| Some((masked(IpAddr::V4(addr), len)?, asn))),
            IpAddr::V6(addr) => self
                .v6
                .longest_match(addr, u8::MAX)
                .and_then(|(len, asn)| Some((masked(IpAddr::V6(addr), len)?, asn))),
        }
    }

    /// Most specific stored prefix containing the whole of `network`.
    pub fn covering_match(&self, network: &IpNetwork) -> Option<(IpNetwork, ASN)> {
        let len = network.prefix();
        match network.network() {
            IpAddr::V4(addr) => self
                .v4
                .longest_match(addr, len)
                .and_then(|(l, asn)| Some((masked(IpAddr::V4(addr), l)?, asn))),
            IpAddr::V6(addr) => self
                .v6
                .longest_match(addr, len)
                .and_then(|(l, asn)| Some((masked(IpAddr::V6(addr), l)?, asn))),
        }
    }

    /// Owner of exactly `network`, if that block was loaded.
    pub fn exact(&self, network: &IpNetwork) -> Option<ASN> {
        match network.network() {
            IpAddr::V4(addr) => self.v4.exact(addr, network.prefix()),
            IpAddr::V6(addr) => self.v6.exact(addr, network.prefix()),
        }
    }

    /// All stored prefixes with their owner, IPv4 before IPv6.
    pub fn entries(&self) -> Vec<(IpNetwork, ASN)> {
        let mut out = self.v4.entries();
        out.extend(self.v6.entries());
        out
    }

    pub fn owned_by(&self, asn: ASN) -> Vec<IpNetwork> {
        self.entries()
            .into_iter()
            .filter(|(_, owner)| *owner == asn)
            .map(|(prefix, _)| prefix)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.v4.len + self.v6.len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn masked(addr: IpAddr, prefix_len: u8) -> Option<IpNetwork> {
    let network = IpNetwork::new(addr, prefix_len).ok()?;
    IpNetwork::new(network.network(), prefix_len).ok()
}

/// Parses one pfx2as line into a block and its owner.
///
/// Accepts `network length AS` (routeviews pfx2as) and `network/length AS`.
/// For multi-origin entries the first AS is the owner. Returns `Ok(None)` for
/// blank lines and `#` comments.
pub fn parse_prefix_record(line: &str) -> Result<Option<(IpNetwork, ASN)>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    let (cidr, as_field) = match fields.as_slice() {
        [net, len, as_field] => (format!("{}/{}", net, len), *as_field),
        [cidr, as_field] if cidr.contains('/') => (cidr.to_string(), *as_field),
        _ => return Err(format!("expected 2 or 3 fields, found {}", fields.len())),
    };

    let prefix: IpNetwork = cidr
        .parse()
        .map_err(|e| format!("invalid prefix {:?}: {}", cidr, e))?;
    let prefix = IpNetwork::new(prefix.network(), prefix.prefix())
        .map_err(|e| format!("invalid prefix {:?}: {}", cidr, e))?;

    let ases = parse_as_list(as_field)?;
    let owner = ases
        .first()
        .copied()
        .ok_or_else(|| format!("no AS number in {:?}", as_field))?;

    Ok(Some((prefix, owner)))
}

/// Reads every pfx2as record of a source.
///
/// With `lenient` set to `None` the first malformed record aborts the read.
/// Passing a warning sink skips malformed records and reports each one there.
pub fn read_prefix_records<R: BufRead>(
    source_name: &str,
    reader: R,
    mut lenient: Option<&mut Warnings>,
) -> Result<Vec<(IpNetwork, ASN)>, MalformedPrefixError> {
    let mut entries = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.map_err(|e| MalformedPrefixError {
            source_name: source_name.to_string(),
            line: line_no,
            content: String::new(),
            reason: format!("read failed: {}", e),
        })?;

        match parse_prefix_record(&line) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(reason) => match lenient.as_deref_mut() {
                Some(warnings) => warnings.push(DataConsistencyWarning::SkippedPrefixRecord {
                    source_name: source_name.to_string(),
                    line: line_no,
                    reason,
                }),
                None => {
                    return Err(MalformedPrefixError {
                        source_name: source_name.to_string(),
                        line: line_no,
                        content: line,
                        reason,
                    })
                }
            },
        }
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn net(s: &str) -> IpNetwork {
        IpNetwork::from_str(s).unwrap()
    }

    #[test]
    fn test_longest_match_prefers_more_specific() {
        let table = PrefixTable::build(vec![(net("10.0.0.0/8"), 100), (net("10.1.0.0/16"), 200)]);

        assert_eq!(table.lookup("10.1.2.3".parse().unwrap()), Some(200));
        assert_eq!(table.lookup("10.2.2.3".parse().unwrap()), Some(100));
        assert_eq!(table.lookup("11.0.0.1".parse().unwrap()), None);
    }

    #[test]
    fn test_last_write_wins() {
        let table = PrefixTable::build(vec![(net("192.0.2.0/24"), 1), (net("192.0.2.0/24"), 2)]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.exact(&net("192.0.2.0/24")), Some(2));
    }

    #[test]
    fn test_default_route_and_host_route() {
        let table = PrefixTable::build(vec![(net("0.0.0.0/0"), 1), (net("203.0.113.7/32"), 7)]);

        assert_eq!(table.lookup("203.0.113.7".parse().unwrap()), Some(7));
        assert_eq!(table.lookup("203.0.113.8".parse().unwrap()), Some(1));
        assert_eq!(
            table.longest_match("203.0.113.8".parse().unwrap()),
            Some((net("0.0.0.0/0"), 1))
        );
    }

    #[test]
    fn test_entries_are_masked_and_ordered() {
        let table = PrefixTable::build(vec![
            (net("10.1.2.3/16"), 200),
            (net("10.0.0.0/8"), 100),
            (net("2001:db8::/32"), 300),
        ]);

        assert_eq!(
            table.entries(),
            vec![
                (net("10.0.0.0/8"), 100),
                (net("10.1.0.0/16"), 200),
                (net("2001:db8::/32"), 300),
            ]
        );
    }

    #[test]
    fn test_parse_prefix_record_formats() {
        assert_eq!(
            parse_prefix_record("1.0.0.0\t24\t13335").unwrap(),
            Some((net("1.0.0.0/24"), 13335))
        );
        assert_eq!(
            parse_prefix_record("2001:db8::/32 64496_64497").unwrap(),
            Some((net("2001:db8::/32"), 64496))
        );
        assert_eq!(parse_prefix_record("# comment").unwrap(), None);
        assert!(parse_prefix_record("1.0.0.0 33 1").is_err());
        assert!(parse_prefix_record("1.0.0.256 24 1").is_err());
        assert!(parse_prefix_record("1.0.0.0 24 ASx").is_err());
    }
}
