//! Text formats exchanged between the batch jobs and the store.
//!
//! * compact postings, one index-builder output line per term:
//!   `term \t docId:f0,f1,f2|p,p,...;docId:...`
//! * stored postings, the JSON value written under a term key:
//!   `[{"docId": {"frequency": [..], "position": [[..], [..], [..]]}}, ...]`
//! * PageRank lines: `docId,rank \t outlink,outlink,...`

use crate::error::CodecError;
use crate::index::{DocId, Posting, FIELD_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

impl fmt::Display for Posting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}|{}", self.doc_id, join(self.frequency.iter()), join(self.position.iter().flatten()))
    }
}

fn join<T: fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|v| v.to_string()).collect::<Vec<_>>().join(",")
}

fn parse_num<T: FromStr>(s: &str) -> Result<T, CodecError> {
    s.trim().parse().map_err(|_| CodecError::InvalidNumber(s.to_string()))
}

fn parse_list<T: FromStr>(s: &str) -> Result<Vec<T>, CodecError> {
    if s.trim().is_empty() {
        return Ok(Vec::new());
    }
    s.split(',').map(parse_num).collect()
}

/// Parse one compact `docId:f0,f1,f2|positions` entry.
pub fn parse_posting(entry: &str) -> Result<Posting, CodecError> {
    let (doc, rest) = entry.split_once(':').ok_or(CodecError::MissingSeparator(':'))?;
    let (freqs, positions) = rest.split_once('|').ok_or(CodecError::MissingSeparator('|'))?;

    let freqs: Vec<u32> = parse_list(freqs)?;
    if freqs.len() != FIELD_COUNT {
        return Err(CodecError::FieldCount { expected: FIELD_COUNT, got: freqs.len() });
    }
    let positions: Vec<u32> = parse_list(positions)?;
    let expected: usize = freqs.iter().map(|&f| f as usize).sum();
    if positions.len() != expected {
        return Err(CodecError::PositionCount { expected, got: positions.len() });
    }

    let mut posting = Posting::new(parse_num(doc)?);
    let mut rest = positions.as_slice();
    for (field, &freq) in freqs.iter().enumerate() {
        let (head, tail) = rest.split_at(freq as usize);
        posting.frequency[field] = freq;
        posting.position[field] = head.to_vec();
        rest = tail;
    }
    Ok(posting)
}

pub fn encode_postings(postings: &[Posting]) -> String {
    postings.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(";")
}

pub fn parse_postings(value: &str) -> Result<Vec<Posting>, CodecError> {
    value.split(';').filter(|e| !e.is_empty()).map(parse_posting).collect()
}

/// Split one index-builder output line into its term and postings.
pub fn parse_index_line(line: &str) -> Result<(String, Vec<Posting>), CodecError> {
    let (term, value) = line.split_once('\t').ok_or(CodecError::MissingSeparator('\t'))?;
    Ok((term.to_string(), parse_postings(value)?))
}

#[derive(Serialize, Deserialize)]
struct StoredPosting {
    frequency: [u32; FIELD_COUNT],
    position: [Vec<u32>; FIELD_COUNT],
}

/// Encode postings as the JSON value stored under a term key.
pub fn postings_to_json(postings: &[Posting]) -> serde_json::Result<String> {
    let value: Vec<BTreeMap<DocId, StoredPosting>> = postings
        .iter()
        .map(|p| {
            let stored = StoredPosting { frequency: p.frequency, position: p.position.clone() };
            BTreeMap::from([(p.doc_id, stored)])
        })
        .collect();
    serde_json::to_string(&value)
}

/// Decode a stored term value; any shape violation is an error.
pub fn postings_from_json(value: &str) -> crate::Result<Vec<Posting>> {
    let decoded: Vec<BTreeMap<DocId, StoredPosting>> = serde_json::from_str(value)?;
    let mut postings = Vec::with_capacity(decoded.len());
    for (doc_id, stored) in decoded.into_iter().flatten() {
        for field in 0..FIELD_COUNT {
            let expected = stored.frequency[field] as usize;
            if stored.position[field].len() != expected {
                return Err(CodecError::PositionCount { expected, got: stored.position[field].len() }.into());
            }
        }
        postings.push(Posting { doc_id, frequency: stored.frequency, position: stored.position });
    }
    Ok(postings)
}

/// One PageRank input/output line.
#[derive(Debug, Clone, PartialEq)]
pub struct RankLine {
    pub doc_id: DocId,
    pub rank: f64,
    pub outlinks: Vec<DocId>,
}

impl fmt::Display for RankLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}\t{}", self.doc_id, self.rank, join(self.outlinks.iter()))
    }
}

impl FromStr for RankLine {
    type Err = CodecError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        // A node without outlinks may lose its trailing tab.
        let (key, links) = line.split_once('\t').unwrap_or((line, ""));
        let (doc, rank) = key.split_once(',').ok_or(CodecError::MissingSeparator(','))?;
        Ok(RankLine { doc_id: parse_num(doc)?, rank: parse_num(rank)?, outlinks: parse_list(links)? })
    }
}
