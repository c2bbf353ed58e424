//! Initials-aware similarity between Person names.
//!
//! "James T. Kirk", "J. T. Kirk", "James Kirk" and "J. Kirk" all name the same
//! person. Two multi-token names sharing a surname are compatible when their
//! given-name tokens agree position by position:
//!
//! - first characters match, and
//! - either token is an initial (`J` or `J.`), or both are full given names
//!
//! So "James Kirk" and "John Kirk" are linked; the surname and the initial
//! carry the evidence. Comparison is case-sensitive, like the surname suffix
//! test of the proximity resolver.
//!
//! Equal token counts compare every position. A one-token and a two-token
//! given name (a skipped middle name) compare the first position only. Any
//! other combination is incompatible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::mention::MentionIdx;
use crate::resolution::NameTable;

/// An undirected "same person" link between two mentions.
pub type EquivalenceEdge = (MentionIdx, MentionIdx);

/// Counters of one similarity pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityReport {
    /// Pairs sharing a surname that were tested.
    pub candidate_pairs: usize,
    /// Pairs found compatible.
    pub edges: usize,
}

/// Returns true if two given-name tokens may denote the same name.
///
/// A token is either an initial (`J`, `J.`) or a full given name, and every
/// pairing of those kinds is allowed, so the first characters decide.
#[must_use]
pub fn tokens_compatible(a: &str, b: &str) -> bool {
    match (a.chars().next(), b.chars().next()) {
        (Some(fa), Some(fb)) => fa == fb,
        _ => false,
    }
}

/// Returns true if two given-name token lists are compatible.
#[must_use]
pub fn given_names_compatible(a: &[&str], b: &[&str]) -> bool {
    match (a.len(), b.len()) {
        (0, _) | (_, 0) => false,
        (x, y) if x == y => a.iter().zip(b).all(|(p, q)| tokens_compatible(p, q)),
        (1, 2) | (2, 1) => tokens_compatible(a[0], b[0]),
        _ => false,
    }
}

/// Returns true if two full names share a surname and compatible given names.
///
/// Both names need at least two tokens.
#[must_use]
pub fn names_compatible(a: &str, b: &str) -> bool {
    let a: Vec<&str> = a.split_whitespace().collect();
    let b: Vec<&str> = b.split_whitespace().collect();
    match (a.split_last(), b.split_last()) {
        (Some((sa, ga)), Some((sb, gb))) => sa == sb && given_names_compatible(ga, gb),
        _ => false,
    }
}

/// Computes equivalence edges between all compatible Person mentions.
///
/// Mentions are bucketed by surname, so only names that can match are
/// compared. Edges are ordered `(lower index, higher index)`.
pub fn equivalence_edges(corpus: &Corpus, names: &NameTable) -> (Vec<EquivalenceEdge>, SimilarityReport) {
    let mut buckets: BTreeMap<String, Vec<(MentionIdx, Vec<&str>)>> = BTreeMap::new();
    for (i, mention) in corpus.mentions().iter().enumerate() {
        if !mention.is_person() {
            continue;
        }
        let idx = MentionIdx::new(i);
        let tokens: Vec<&str> = names.get(idx).split_whitespace().collect();
        if tokens.len() < 2 {
            continue;
        }
        let surname = tokens[tokens.len() - 1].to_string();
        buckets.entry(surname).or_default().push((idx, tokens));
    }

    let mut edges = Vec::new();
    let mut report = SimilarityReport::default();
    for members in buckets.values() {
        for (i, (a, ta)) in members.iter().enumerate() {
            for (b, tb) in &members[i + 1..] {
                report.candidate_pairs += 1;
                if given_names_compatible(&ta[..ta.len() - 1], &tb[..tb.len() - 1]) {
                    edges.push((*a, *b));
                }
            }
        }
    }
    report.edges = edges.len();
    (edges, report)
}
