//! Mention types and identity.
//!
//! A mention is one occurrence of an entity extracted from one page. Mentions
//! and mention-relations are the raw material every resolution stage reads;
//! they are created once by extraction and only removed by stability
//! cleansing.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Arena index of a mention inside a [`Corpus`](crate::corpus::Corpus).
///
/// Indices are dense and only valid for the corpus snapshot that produced
/// them. Resolution stages key all their working state by this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MentionIdx(u32);

impl MentionIdx {
    /// Creates an index from a position in the mention arena.
    ///
    /// # Panics
    /// Panics if `index` does not fit in `u32`; a corpus never grows that large.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("mention arena exceeds u32::MAX entries"))
    }

    /// Returns the arena position.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for MentionIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arena index of a mention-relation inside a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationIdx(u32);

impl RelationIdx {
    /// Creates an index from a position in the relation arena.
    ///
    /// # Panics
    /// Panics if `index` does not fit in `u32`.
    #[must_use]
    pub fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("relation arena exceeds u32::MAX entries"))
    }

    /// Returns the arena position.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

fn stable_digest(parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    let hex = hasher.finalize().to_hex();
    hex.as_str()[..32].to_string()
}

/// Stable mention identifier.
///
/// Derived from the page, the extraction-local id, the label and the surface
/// name, so the same extraction reproduced by a later run maps to the same
/// identifier. Arena indices change when a corpus is cleansed; this does not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MentionId(String);

impl MentionId {
    /// Derives the identifier of a mention.
    #[must_use]
    pub fn derive(page_id: &str, local_id: &str, label: &Label, name: &str) -> Self {
        Self(stable_digest(&["mention", page_id, local_id, label.as_str(), name]))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable mention-relation identifier, recorded in canonical `orig_ids`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationId(String);

impl RelationId {
    /// Derives the identifier of a relation between two mentions.
    #[must_use]
    pub fn derive(source: &MentionId, rel_type: &str, target: &MentionId) -> Self {
        Self(stable_digest(&["relation", source.as_str(), rel_type, target.as_str()]))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity label of a mention or canonical node.
///
/// The four labels the engine resolves are explicit variants. Anything else
/// the extractor produces (e.g. `Technology`) is kept verbatim as `Other` and
/// can be remapped by the KG schema's label rename table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Label {
    /// A human person
    Person,
    /// A company, institution, or group
    Organization,
    /// A research discipline, technology or line of work
    Occupation,
    /// An academic or professional title
    Title,
    /// Any other extractor-supplied label
    Other(String),
}

impl Label {
    /// Normalizes an extractor label: every whitespace token is title-cased and
    /// the tokens are joined without separator (`"job title"` -> `JobTitle`).
    ///
    /// Returns `None` for a blank label.
    #[must_use]
    pub fn from_extraction(raw: &str) -> Option<Self> {
        let joined: String = raw
            .split_whitespace()
            .map(|token| {
                let mut chars = token.chars();
                chars.next().map_or_else(String::new, |first| {
                    first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
                })
            })
            .collect();
        Self::try_from(joined).ok()
    }

    /// Returns the canonical spelling of the label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "Person",
            Self::Organization => "Organization",
            Self::Occupation => "Occupation",
            Self::Title => "Title",
            Self::Other(name) => name,
        }
    }

    /// Returns true for the labels the KG Builder owns and resets.
    #[must_use]
    pub const fn is_canonical(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl TryFrom<String> for Label {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        if value.is_empty() {
            return Err("label cannot be empty".to_string());
        }

        Ok(if value.eq_ignore_ascii_case("person") {
            Self::Person
        } else if value.eq_ignore_ascii_case("organization") {
            Self::Organization
        } else if value.eq_ignore_ascii_case("occupation") {
            Self::Occupation
        } else if value.eq_ignore_ascii_case("title") {
            Self::Title
        } else {
            Self::Other(value.to_string())
        })
    }
}

impl From<Label> for String {
    fn from(value: Label) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page and file provenance of a mention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Page the mention was extracted from.
    pub page_id: String,
    /// File holding the page.
    pub file_id: String,
    /// Position of the page within the file.
    pub page_index: u32,
}

/// One occurrence of an entity extracted from one page.
///
/// The resolution key (`normalized_name`) is deliberately not stored here:
/// stages thread it through a [`NameTable`](crate::resolution::NameTable) so
/// that the mention record itself stays exactly as extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    /// Stable identifier.
    pub id: MentionId,

    /// Identifier assigned by the extractor, unique within one page payload.
    pub local_id: String,

    /// Surface string as extracted.
    pub name: String,

    /// Entity label, possibly a raw extractor label.
    pub label: Label,

    /// Honorifics or roles attached to a Person mention.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub titles: Vec<String>,

    /// Extractor-supplied sub-type (e.g. "university" for an organization).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Where the mention was found.
    pub provenance: Provenance,

    /// Extraction runs that produced this mention.
    #[serde(default)]
    pub runs: Vec<String>,

    /// Passthrough properties the engine does not interpret.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Mention {
    /// Creates a mention with a derived stable identifier and no runs.
    #[must_use]
    pub fn new(
        local_id: impl Into<String>,
        name: impl Into<String>,
        label: Label,
        provenance: Provenance,
    ) -> Self {
        let local_id = local_id.into();
        let name = name.into();
        Self {
            id: MentionId::derive(&provenance.page_id, &local_id, &label, &name),
            local_id,
            name,
            label,
            titles: Vec::new(),
            entity_type: None,
            provenance,
            runs: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Returns true if the mention is a Person mention.
    #[must_use]
    pub fn is_person(&self) -> bool {
        self.label == Label::Person
    }

    /// Returns true if `run` reproduced this mention.
    #[must_use]
    pub fn seen_in(&self, run: &str) -> bool {
        self.runs.iter().any(|r| r == run)
    }
}

/// A directed, typed edge between two mentions of the same page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionRelation {
    /// Stable identifier.
    pub id: RelationId,
    /// Source mention.
    pub source: MentionIdx,
    /// Target mention.
    pub target: MentionIdx,

    /// Relation label as extracted, upper snake case (e.g. `WORKS_FOR`).
    pub rel_type: String,

    /// Sentiment reported by the extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,

    /// Conversation type reported by the extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,

    /// Extraction runs that produced this relation.
    #[serde(default)]
    pub runs: Vec<String>,

    /// Passthrough properties.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl MentionRelation {
    /// Returns true if `run` reproduced this relation.
    #[must_use]
    pub fn seen_in(&self, run: &str) -> bool {
        self.runs.iter().any(|r| r == run)
    }
}

/// Records `run` in a run list, keeping the list a set.
pub(crate) fn add_run(runs: &mut Vec<String>, run: &str) {
    if !runs.iter().any(|r| r == run) {
        runs.push(run.to_string());
    }
}
