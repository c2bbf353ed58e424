//! Relational corroboration of surname matches.
//!
//! A bare surname far away from the full name is weak evidence on its own.
//! It becomes strong when both mentions relate to the same (or a similar)
//! organization, occupation or title:
//!
//! ```text
//! "I. B. Conant" -WORKS_FOR-> "Harvard University"
//!                                     | similar
//! "Conant"       -WORKS_FOR-> "Harvard"
//! ```
//!
//! The resulting pairs are advisory: they are reported, and only feed the
//! equivalence classes when `CorroborationConfig::merge_into_clusters` is set.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::{ContainmentConfig, CorroborationConfig};
use crate::corpus::Corpus;
use crate::kg::SimilarityKind;
use crate::mention::{Label, MentionIdx};
use crate::resolution::proximity::MIN_NAME_CHARS;
use crate::resolution::similarity::EquivalenceEdge;
use crate::resolution::NameTable;

/// A directed containment link: `from`'s name contains `to`'s name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SimilarLink {
    /// Mention whose name contains the other's.
    pub from: MentionIdx,
    /// Mention whose name is contained.
    pub to: MentionIdx,
    /// Organization or Occupation link.
    pub kind: SimilarityKind,
}

/// Counters of one corroboration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorroborationReport {
    /// Links between Occupation mentions.
    pub occupation_links: usize,
    /// Links between Organization mentions.
    pub organization_links: usize,
    /// Person pairs corroborated by their relations.
    pub resolved_pairs: usize,
    /// Whether the pairs were composed into the equivalence classes.
    pub composed: bool,
}

/// Output of [`corroborate`].
#[derive(Debug, Clone, Default)]
pub struct Corroboration {
    /// Containment links, grouped by kind.
    pub links: Vec<SimilarLink>,
    /// `(full name mention, surname mention)` pairs.
    pub pairs: Vec<EquivalenceEdge>,
    /// Counters of the pass.
    pub report: CorroborationReport,
}

/// Computes containment links between Occupation and Organization mentions.
///
/// Occupation names are compared after normalization; Organization names
/// are compared case-insensitively.
pub fn similar_links(corpus: &Corpus, names: &NameTable, containment: &ContainmentConfig) -> Vec<SimilarLink> {
    let mut by_kind: BTreeMap<SimilarityKind, Vec<(MentionIdx, &str)>> = BTreeMap::new();
    for (i, mention) in corpus.mentions().iter().enumerate() {
        let kind = match mention.label {
            Label::Occupation => SimilarityKind::SimilarOccupation,
            Label::Organization => SimilarityKind::SimilarOrganization,
            _ => continue,
        };
        let idx = MentionIdx::new(i);
        by_kind.entry(kind).or_default().push((idx, names.get(idx)));
    }

    let mut links = Vec::new();
    for (&kind, members) in &by_kind {
        for &(from, container) in members {
            for &(to, contained) in members {
                if from != to && containment.is_similar(kind, container, contained) {
                    links.push(SimilarLink { from, to, kind });
                }
            }
        }
    }
    links
}

/// Finds Person pairs whose surname match is backed by related targets.
pub fn corroborate(
    corpus: &Corpus,
    names: &NameTable,
    containment: &ContainmentConfig,
    config: &CorroborationConfig,
) -> Corroboration {
    let links = similar_links(corpus, names, containment);
    let linked: HashSet<(MentionIdx, MentionIdx)> = links
        .iter()
        .flat_map(|l| [(l.from, l.to), (l.to, l.from)])
        .collect();

    let mut targets: HashMap<MentionIdx, Vec<MentionIdx>> = HashMap::new();
    for rel in corpus.relations() {
        if config.relation_types.iter().any(|t| t == &rel.rel_type) {
            targets.entry(rel.source).or_default().push(rel.target);
        }
    }

    let mut by_surname: BTreeMap<&str, Vec<MentionIdx>> = BTreeMap::new();
    for (i, mention) in corpus.mentions().iter().enumerate() {
        let idx = MentionIdx::new(i);
        if !mention.is_person() || !targets.contains_key(&idx) {
            continue;
        }
        let name = names.get(idx);
        if name.chars().count() <= MIN_NAME_CHARS {
            continue;
        }
        if let Some(surname) = name.split_whitespace().last() {
            by_surname.entry(surname).or_default().push(idx);
        }
    }

    let mut pairs = Vec::new();
    for members in by_surname.values() {
        for &full in members {
            for &short in members {
                if full == short {
                    continue;
                }
                let suffix = format!(" {}", names.get(short));
                if !names.get(full).ends_with(&suffix) {
                    continue;
                }
                let backed = targets[&full]
                    .iter()
                    .any(|&a| targets[&short].iter().any(|&b| linked.contains(&(a, b))));
                if backed {
                    tracing::debug!(full = %names.get(full), short = %names.get(short), "surname corroborated by relations");
                    pairs.push((full, short));
                }
            }
        }
    }

    let report = CorroborationReport {
        occupation_links: links
            .iter()
            .filter(|l| l.kind == SimilarityKind::SimilarOccupation)
            .count(),
        organization_links: links
            .iter()
            .filter(|l| l.kind == SimilarityKind::SimilarOrganization)
            .count(),
        resolved_pairs: pairs.len(),
        composed: config.merge_into_clusters,
    };
    Corroboration { links, pairs, report }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RelationProps;
    use crate::mention::{Mention, Provenance};

    fn prov(page: &str, index: u32) -> Provenance {
        Provenance {
            page_id: page.to_string(),
            file_id: "diary".to_string(),
            page_index: index,
        }
    }

    fn corpus() -> Corpus {
        let mut corpus = Corpus::new();
        let conant = corpus.add_mention(Mention::new("1", "I. B. Conant", Label::Person, prov("diary_79", 79)));
        let harvard_u = corpus.add_mention(Mention::new(
            "2",
            "Harvard University",
            Label::Organization,
            prov("diary_79", 79),
        ));
        let short = corpus.add_mention(Mention::new("1", "Conant", Label::Person, prov("diary_52", 52)));
        let harvard = corpus.add_mention(Mention::new("2", "harvard", Label::Organization, prov("diary_52", 52)));
        let stranger = corpus.add_mention(Mention::new("3", "Conant", Label::Person, prov("diary_10", 10)));
        let university =
            corpus.add_mention(Mention::new("4", "University", Label::Organization, prov("diary_10", 10)));

        corpus.add_relation(conant, "WORKS_FOR", harvard_u, RelationProps::default(), Some("r"));
        corpus.add_relation(short, "WORKS_FOR", harvard, RelationProps::default(), Some("r"));
        corpus.add_relation(stranger, "WORKS_FOR", university, RelationProps::default(), Some("r"));
        corpus
    }

    #[test]
    fn test_similar_links_are_directional_with_stopwords() {
        let corpus = corpus();
        let names = NameTable::seed(&corpus);
        let links = similar_links(&corpus, &names, &ContainmentConfig::default());
        let pairs: Vec<(usize, usize)> = links.iter().map(|l| (l.from.index(), l.to.index())).collect();
        // "Harvard University" contains "harvard"; "University" is a stopword.
        assert_eq!(pairs, vec![(1, 3)]);
    }

    #[test]
    fn test_corroborated_pair() {
        let corpus = corpus();
        let names = NameTable::seed(&corpus);
        let result = corroborate(
            &corpus,
            &names,
            &ContainmentConfig::default(),
            &CorroborationConfig::default(),
        );
        assert_eq!(result.pairs, vec![(MentionIdx::new(0), MentionIdx::new(2))]);
        assert_eq!(result.report.resolved_pairs, 1);
        assert_eq!(result.report.organization_links, 1);
        assert!(!result.report.composed);
    }

    #[test]
    fn test_unrelated_types_do_not_corroborate() {
        let corpus = corpus();
        let names = NameTable::seed(&corpus);
        let config = CorroborationConfig {
            relation_types: vec!["STUDENT_OF".to_string()],
            ..CorroborationConfig::default()
        };
        let result = corroborate(&corpus, &names, &ContainmentConfig::default(), &config);
        assert!(result.pairs.is_empty());
    }
}
