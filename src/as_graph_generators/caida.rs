use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use bzip2::read::BzDecoder;

use crate::as_graph::{ASGraph, LinkUpdate, ASN};
use crate::error::TopologyError;
use crate::shared::{parse_as_list, DataConsistencyWarning, LinkKind, Warnings};

/// A named line-oriented input.
pub struct InputSource<R> {
    pub name: String,
    pub reader: R,
}

impl<R: BufRead> InputSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        InputSource {
            name: name.into(),
            reader,
        }
    }
}

impl InputSource<Box<dyn BufRead>> {
    /// Opens a file, decompressing it on the fly when it ends in `.bz2`.
    pub fn open(path: &Path) -> Result<Self, TopologyError> {
        let name = path.display().to_string();
        let file = File::open(path).map_err(|source| TopologyError::Io {
            source_name: name.clone(),
            source,
        })?;

        let reader: Box<dyn BufRead> = if path.extension().map_or(false, |ext| ext == "bz2") {
            Box::new(BufReader::new(BzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Ok(InputSource { name, reader })
    }
}

/// One AS-link line after parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRecord {
    Link {
        kind: LinkKind,
        from: Vec<ASN>,
        to: Vec<ASN>,
    },
    /// Comments, monitor and metadata lines
    Skip,
}

/// Parses one AS-link line.
///
/// Understood forms:
///
/// - CAIDA aslinks: `D from to monitors...` and `I from to monitors...`, where
///   `from`/`to` may be MOAS groups (`X_Y`) or sets (`X,Y`). `M` and `T` lines
///   are metadata.
/// - CAIDA as-rel: `a|b|rel[|source]`.
/// - Free-form pairs: `a b`, and CSV pairs `a,b` or `a, b`.
pub fn parse_link_record(line: &str) -> Result<LinkRecord, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(LinkRecord::Skip);
    }

    if line.contains('|') {
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() < 2 {
            return Err("expected at least two '|' separated fields".to_string());
        }
        return Ok(LinkRecord::Link {
            kind: LinkKind::Direct,
            from: parse_as_list(fields[0])?,
            to: parse_as_list(fields[1])?,
        });
    }

    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        ["M", ..] | ["T", ..] => Ok(LinkRecord::Skip),
        [tag, from, to, ..] if *tag == "D" || *tag == "I" => {
            let kind = if *tag == "D" {
                LinkKind::Direct
            } else {
                LinkKind::Indirect
            };
            Ok(LinkRecord::Link {
                kind,
                from: parse_as_list(from)?,
                to: parse_as_list(to)?,
            })
        }
        // CSV pairs: `a,b` or `a, b`
        [pair] if pair.matches(',').count() == 1 => {
            let (from, to) = pair.split_once(',').unwrap_or((pair, ""));
            Ok(LinkRecord::Link {
                kind: LinkKind::Direct,
                from: parse_as_list(from)?,
                to: parse_as_list(to)?,
            })
        }
        [from, to] if from.ends_with(',') => Ok(LinkRecord::Link {
            kind: LinkKind::Direct,
            from: parse_as_list(from.trim_end_matches(','))?,
            to: parse_as_list(to)?,
        }),
        [from, to] => Ok(LinkRecord::Link {
            kind: LinkKind::Direct,
            from: parse_as_list(from)?,
            to: parse_as_list(to)?,
        }),
        _ => Err(format!("unrecognised link record with {} fields", fields.len())),
    }
}

/// Reads every link of a source into `graph`.
///
/// Links are created for the cross product of both AS fields. Pairs already
/// present are coalesced and reported as duplicates.
pub fn read_links<R: BufRead>(
    source: InputSource<R>,
    graph: &mut ASGraph,
    warnings: &mut Warnings,
) -> Result<usize, TopologyError> {
    let InputSource { name, reader } = source;
    let mut records = 0usize;

    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| TopologyError::Io {
            source_name: name.clone(),
            source,
        })?;

        let (kind, from, to) = match parse_link_record(&line) {
            Ok(LinkRecord::Link { kind, from, to }) => (kind, from, to),
            Ok(LinkRecord::Skip) => continue,
            Err(reason) => {
                log::debug!("{}:{}: {}", name, i + 1, reason);
                return Err(TopologyError::MalformedLink {
                    source_name: name,
                    line: i + 1,
                    content: line,
                });
            }
        };
        records += 1;

        for &x in &from {
            for &y in &to {
                match graph.add_link(x, y, kind) {
                    LinkUpdate::Created => {}
                    LinkUpdate::Coalesced => {
                        let (a, b) = if x <= y { (x, y) } else { (y, x) };
                        warnings.push(DataConsistencyWarning::DuplicateLink { a, b });
                    }
                    LinkUpdate::SelfLoop => {
                        warnings.push(DataConsistencyWarning::SelfLink { asn: x });
                    }
                }
            }
        }
    }

    log::debug!("Read {} link records from {}", records, name);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direct_and_indirect_lines() {
        assert_eq!(
            parse_link_record("D\t1\t2\t3 4").unwrap(),
            LinkRecord::Link {
                kind: LinkKind::Direct,
                from: vec![1],
                to: vec![2]
            }
        );
        assert_eq!(
            parse_link_record("I 1_5 2,6 7").unwrap(),
            LinkRecord::Link {
                kind: LinkKind::Indirect,
                from: vec![1, 5],
                to: vec![2, 6]
            }
        );
    }

    #[test]
    fn test_parse_other_formats() {
        assert_eq!(
            parse_link_record("174|3356|0|bgp").unwrap(),
            LinkRecord::Link {
                kind: LinkKind::Direct,
                from: vec![174],
                to: vec![3356]
            }
        );
        assert_eq!(
            parse_link_record("AS1 AS2").unwrap(),
            LinkRecord::Link {
                kind: LinkKind::Direct,
                from: vec![1],
                to: vec![2]
            }
        );
        for csv in ["7,9", "7, 9"] {
            assert_eq!(
                parse_link_record(csv).unwrap(),
                LinkRecord::Link {
                    kind: LinkKind::Direct,
                    from: vec![7],
                    to: vec![9]
                }
            );
        }
        assert_eq!(parse_link_record("M 1 2 3").unwrap(), LinkRecord::Skip);
        assert_eq!(parse_link_record("T 100 200").unwrap(), LinkRecord::Skip);
        assert_eq!(parse_link_record("# header").unwrap(), LinkRecord::Skip);
        assert!(parse_link_record("X 1 2").is_err());
        assert!(parse_link_record("D 1 two").is_err());
        assert!(parse_link_record("1,2,3").is_err());
    }

    #[test]
    fn test_read_links_expands_moas() {
        let mut graph = ASGraph::new();
        let mut warnings = Warnings::new();
        let data = "D 1_2 3 m1\nD 3 1 m2\nD 4 4 m3\n";

        let source = InputSource::new("mem", data.as_bytes());
        let records = read_links(source, &mut graph, &mut warnings).unwrap();

        assert_eq!(records, 3);
        assert_eq!(graph.link_count(), 2);
        assert!(graph.link(1, 3).is_some());
        assert!(graph.link(2, 3).is_some());
        assert_eq!(warnings.len(), 2);
    }
}
