//! Entity resolution stages.
//!
//! The stages run strictly in order over one corpus snapshot, each reading
//! and rewriting the normalized names in a [`NameTable`]:
//!
//! 1. [`normalize`]: honorific stripping and occupation lower-casing
//! 2. [`resolve_proximity`]: surname-only mentions near a full name
//! 3. [`equivalence_edges`]: initials-aware Person similarity
//! 4. [`corroborate`]: relation-backed surname pairs (advisory)
//! 5. connected components over the equivalence edges, then
//!    [`assign_canonical`]
//!
//! The component forest is discarded once names are assigned; only the
//! names survive into the KG Builder.

mod canonical;
mod components;
mod corroboration;
mod names;
mod normalize;
mod proximity;
mod similarity;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::corpus::Corpus;
use crate::mention::MentionId;

pub use canonical::{assign_canonical, representative, CanonicalReport};
pub use components::DisjointSet;
pub use corroboration::{corroborate, similar_links, Corroboration, CorroborationReport, SimilarLink};
pub use names::{NameTable, ResolvedNames};
pub use normalize::{normalize, Honorifics, NormalizeReport};
pub use proximity::{resolve_proximity, ProximityReport, MIN_NAME_CHARS};
pub use similarity::{
    equivalence_edges, given_names_compatible, names_compatible, tokens_compatible, EquivalenceEdge,
    SimilarityReport,
};

/// Reports of every resolution stage of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Normalizer counters.
    pub normalize: NormalizeReport,
    /// Proximity Resolver counters.
    pub proximity: ProximityReport,
    /// Similarity Resolver counters.
    pub similarity: SimilarityReport,
    /// Corroboration Resolver counters.
    pub corroboration: CorroborationReport,
    /// Relation-backed `(full name, surname)` mention pairs.
    pub corroborated_pairs: Vec<(MentionId, MentionId)>,
    /// Person mentions touched by at least one equivalence edge.
    pub linked_mentions: usize,
    /// Equivalence classes and renamed mentions.
    pub canonical: CanonicalReport,
}

/// Runs all resolution stages over `corpus`, rewriting `names` in place.
pub fn resolve(corpus: &Corpus, names: &mut NameTable, config: &PipelineConfig) -> ResolutionReport {
    let mut report = ResolutionReport::default();

    {
        let _span = tracing::info_span!("normalize").entered();
        report.normalize = normalize(corpus, names, &config.normalizer);
        tracing::info!(
            persons = report.normalize.persons_stripped,
            occupations = report.normalize.occupations_lowered,
            "names normalized"
        );
    }

    {
        let _span = tracing::info_span!("proximity").entered();
        report.proximity = resolve_proximity(corpus, names);
        tracing::info!(
            same_page = report.proximity.same_page,
            adjacent_page = report.proximity.adjacent_page,
            ambiguous = report.proximity.ambiguous,
            "surnames resolved by proximity"
        );
    }

    let edges = {
        let _span = tracing::info_span!("similarity").entered();
        let (edges, similarity) = equivalence_edges(corpus, names);
        report.similarity = similarity;
        tracing::info!(
            candidates = similarity.candidate_pairs,
            edges = similarity.edges,
            "person similarity computed"
        );
        edges
    };

    let corroboration = {
        let _span = tracing::info_span!("corroboration").entered();
        let result = corroborate(corpus, names, &config.containment, &config.corroboration);
        tracing::info!(
            occupation_links = result.report.occupation_links,
            organization_links = result.report.organization_links,
            pairs = result.report.resolved_pairs,
            composed = result.report.composed,
            "surname pairs corroborated"
        );
        result
    };
    report.corroboration = corroboration.report;
    report.corroborated_pairs = corroboration
        .pairs
        .iter()
        .filter_map(|&(a, b)| Some((corpus.mention(a)?.id.clone(), corpus.mention(b)?.id.clone())))
        .collect();

    {
        let _span = tracing::info_span!("canonical").entered();
        let mut forest = DisjointSet::new(names.len());
        let mut linked = vec![false; names.len()];
        let composed: &[EquivalenceEdge] = if config.corroboration.merge_into_clusters {
            corroboration.pairs.as_slice()
        } else {
            &[]
        };
        for &(a, b) in edges.iter().chain(composed) {
            forest.union(a.index(), b.index());
            linked[a.index()] = true;
            linked[b.index()] = true;
        }
        report.linked_mentions = linked.iter().filter(|&&l| l).count();

        let classes = forest.groups(|i| linked[i]);
        report.canonical = assign_canonical(names, &classes);
        tracing::info!(
            classes = report.canonical.classes,
            renamed = report.canonical.renamed,
            "canonical names assigned"
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mention::{Label, Mention, MentionIdx, Provenance};

    fn prov(page: &str, index: u32) -> Provenance {
        Provenance {
            page_id: page.to_string(),
            file_id: crate::corpus::file_id_from_page_id(page),
            page_index: index,
        }
    }

    #[test]
    fn test_kirk_transitivity() {
        let mut corpus = Corpus::new();
        let full = corpus.add_mention(Mention::new("1", "James T. Kirk", Label::Person, prov("log_1", 1)));
        let initial = corpus.add_mention(Mention::new("2", "J. Kirk", Label::Person, prov("log_1", 1)));
        let bare = corpus.add_mention(Mention::new("3", "Kirk", Label::Person, prov("log_1", 1)));
        let mut names = NameTable::seed(&corpus);

        let report = resolve(&corpus, &mut names, &PipelineConfig::default());
        for idx in [full, initial, bare] {
            assert_eq!(names.get(idx), "James T. Kirk");
        }
        assert_eq!(report.canonical.classes, 1);
    }

    #[test]
    fn test_full_given_names_sharing_initial_merge() {
        let mut corpus = Corpus::new();
        let james = corpus.add_mention(Mention::new("1", "James T. Kirk", Label::Person, prov("log_2", 2)));
        let john = corpus.add_mention(Mention::new("2", "John T. Kirk", Label::Person, prov("log_9", 9)));
        let mut names = NameTable::seed(&corpus);

        let report = resolve(&corpus, &mut names, &PipelineConfig::default());
        assert_eq!(report.similarity.edges, 1);
        assert_eq!(names.get(james), "James T. Kirk");
        assert_eq!(names.get(john), "James T. Kirk");
    }

    #[test]
    fn test_surname_case_separates_in_every_stage() {
        let mut corpus = Corpus::new();
        let full = corpus.add_mention(Mention::new("1", "James T. Kirk", Label::Person, prov("log_3", 3)));
        let bare = corpus.add_mention(Mention::new("2", "kirk", Label::Person, prov("log_3", 3)));
        let initial = corpus.add_mention(Mention::new("3", "J. kirk", Label::Person, prov("log_3", 3)));
        let mut names = NameTable::seed(&corpus);

        let report = resolve(&corpus, &mut names, &PipelineConfig::default());
        // Only the two lower-case mentions link, after proximity renames "kirk".
        assert_eq!(report.similarity.edges, 1);
        assert_eq!(report.canonical.classes, 1);
        assert_eq!(names.get(full), "James T. Kirk");
        assert_eq!(names.get(bare), "J. kirk");
        assert_eq!(names.get(initial), "J. kirk");
    }

    #[test]
    fn test_resolve_twice_is_stable() {
        let mut corpus = Corpus::new();
        corpus.add_mention(Mention::new("1", "Dr. George E. Hale", Label::Person, prov("diary_1", 1)));
        corpus.add_mention(Mention::new("2", "Hale", Label::Person, prov("diary_2", 2)));
        corpus.add_mention(Mention::new("3", "G. Hale", Label::Person, prov("diary_9", 9)));
        corpus.add_mention(Mention::new("4", "Physics", Label::Occupation, prov("diary_9", 9)));
        let mut names = NameTable::seed(&corpus);
        resolve(&corpus, &mut names, &PipelineConfig::default());
        let first = names.clone();

        resolve(&corpus, &mut names, &PipelineConfig::default());
        assert_eq!(names, first);
        assert_eq!(names.get(MentionIdx::new(1)), "George E. Hale");
        assert_eq!(names.get(MentionIdx::new(2)), "George E. Hale");
        assert_eq!(names.get(MentionIdx::new(3)), "physics");
    }
}
