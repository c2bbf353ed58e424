//! The resolution key table.
//!
//! Every stage reads and rewrites exactly one field per mention: its
//! normalized name. Instead of mutating mention records, stages receive a
//! `NameTable` by mutable reference. The table counts its own revisions, so
//! a stage (or a test) can tell whether a pass reached a fixed point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::mention::{MentionId, MentionIdx};

/// Mapping from mention index to current normalized name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTable {
    names: Vec<String>,
    version: u64,
}

impl NameTable {
    /// Seeds the table with each mention's surface name.
    #[must_use]
    pub fn seed(corpus: &Corpus) -> Self {
        Self {
            names: corpus.mentions().iter().map(|m| m.name.clone()).collect(),
            version: 0,
        }
    }

    /// Seeds the table from previously stored names, falling back to the
    /// surface name for mentions without one.
    #[must_use]
    pub fn restore(corpus: &Corpus, stored: &ResolvedNames) -> Self {
        Self {
            names: corpus
                .mentions()
                .iter()
                .map(|m| {
                    stored
                        .get(&m.id)
                        .filter(|n| !n.is_empty())
                        .map_or_else(|| m.name.clone(), Clone::clone)
                })
                .collect(),
            version: 0,
        }
    }

    /// Current normalized name of a mention.
    ///
    /// # Panics
    /// Panics if `idx` does not belong to the corpus the table was seeded from.
    #[must_use]
    pub fn get(&self, idx: MentionIdx) -> &str {
        &self.names[idx.index()]
    }

    /// Rewrites a mention's normalized name.
    ///
    /// Empty names are refused so the key is never blank. Returns true if
    /// the stored value changed.
    pub fn set(&mut self, idx: MentionIdx, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let slot = &mut self.names[idx.index()];
        if slot.as_str() == name {
            return false;
        }
        name.clone_into(slot);
        self.version += 1;
        true
    }

    /// Number of effective rewrites since seeding.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(index, name)` pairs in arena order.
    pub fn iter(&self) -> impl Iterator<Item = (MentionIdx, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| (MentionIdx::new(i), n.as_str()))
    }

    /// Exports the names keyed by stable mention id for storage.
    #[must_use]
    pub fn export(&self, corpus: &Corpus) -> ResolvedNames {
        ResolvedNames(
            corpus
                .mentions()
                .iter()
                .zip(&self.names)
                .map(|(m, n)| (m.id.clone(), n.clone()))
                .collect(),
        )
    }
}

/// Normalized names keyed by stable mention id, as persisted by a mention
/// store between pipeline runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedNames(BTreeMap<MentionId, String>);

impl ResolvedNames {
    /// Name stored for a mention.
    #[must_use]
    pub fn get(&self, id: &MentionId) -> Option<&String> {
        self.0.get(id)
    }

    /// Number of stored names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over `(mention id, name)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&MentionId, &String)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mention::{Label, Mention, Provenance};

    fn corpus() -> Corpus {
        let prov = Provenance {
            page_id: "f_1".to_string(),
            file_id: "f".to_string(),
            page_index: 1,
        };
        let mut corpus = Corpus::new();
        corpus.add_mention(Mention::new("a", "Dr. Hale", Label::Person, prov.clone()));
        corpus.add_mention(Mention::new("b", "Bush", Label::Person, prov));
        corpus
    }

    #[test]
    fn test_seed_and_set_track_versions() {
        let corpus = corpus();
        let mut names = NameTable::seed(&corpus);
        let a = MentionIdx::new(0);
        assert_eq!(names.get(a), "Dr. Hale");
        assert!(names.set(a, "Hale"));
        assert!(!names.set(a, "Hale"));
        assert!(!names.set(a, ""));
        assert_eq!(names.get(a), "Hale");
        assert_eq!(names.version(), 1);
    }

    #[test]
    fn test_export_restore() {
        let corpus = corpus();
        let mut names = NameTable::seed(&corpus);
        names.set(MentionIdx::new(0), "George E. Hale");
        let stored = names.export(&corpus);
        assert_eq!(stored.len(), 2);

        let restored = NameTable::restore(&corpus, &stored);
        assert_eq!(restored.get(MentionIdx::new(0)), "George E. Hale");
        assert_eq!(restored.get(MentionIdx::new(1)), "Bush");

        let fallback = NameTable::restore(&corpus, &ResolvedNames::default());
        assert_eq!(fallback.get(MentionIdx::new(0)), "Dr. Hale");
    }
}
