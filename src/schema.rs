//! Knowledge-graph schema.
//!
//! The schema decides which mention-relations become canonical relations.
//! Labels and relation types are first passed through rename tables, then
//! the resulting `(source label, relation, target label)` triple must be one
//! of the allowed triples. Anything else is dropped and counted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::mention::Label;

fn relation_token() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("relation token pattern is valid"))
}

/// Returns true if `value` is an upper snake case relation type token.
#[must_use]
pub fn is_relation_token(value: &str) -> bool {
    relation_token().is_match(value)
}

fn check_relation_token(value: &str) -> Result<(), ValidationError> {
    if is_relation_token(value) {
        Ok(())
    } else {
        Err(ValidationError::InvalidRelationType {
            value: value.to_string(),
        })
    }
}

/// One allowed `(source label, relation, target label)` combination.
///
/// Serialized as a three-element array: `["Person", "WORKS_FOR", "Organization"]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "(Label, String, Label)", into = "(Label, String, Label)")]
pub struct SchemaTriple {
    /// Source label.
    pub source: Label,
    /// Relation type.
    pub relation: String,
    /// Target label.
    pub target: Label,
}

impl SchemaTriple {
    /// Creates a triple.
    #[must_use]
    pub fn new(source: Label, relation: impl Into<String>, target: Label) -> Self {
        Self {
            source,
            relation: relation.into(),
            target,
        }
    }
}

impl From<(Label, String, Label)> for SchemaTriple {
    fn from((source, relation, target): (Label, String, Label)) -> Self {
        Self {
            source,
            relation,
            target,
        }
    }
}

impl From<SchemaTriple> for (Label, String, Label) {
    fn from(t: SchemaTriple) -> Self {
        (t.source, t.relation, t.target)
    }
}

/// Label and relation rename tables plus the ordered allowed triples.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgSchema {
    /// Raw label -> schema label.
    pub label_renames: BTreeMap<Label, Label>,
    /// Extractor relation type -> schema relation type.
    pub relation_renames: BTreeMap<String, String>,
    /// Allowed `(source, relation, target)` triples, in order.
    pub triples: Vec<SchemaTriple>,
}

impl Default for KgSchema {
    fn default() -> Self {
        let label_renames = [(Label::Other("Technology".to_string()), Label::Occupation)]
            .into_iter()
            .collect();
        let relation_renames = ["TALKED_TO", "MET", "TOOK_LUNCHEON_WITH", "MENTIONED", "MENTIONS"]
            .into_iter()
            .map(|from| (from.to_string(), "TALKED_WITH".to_string()))
            .collect();
        let triples = vec![
            SchemaTriple::new(Label::Person, "WORKS_FOR", Label::Organization),
            SchemaTriple::new(Label::Person, "WORKS_ON", Label::Occupation),
            SchemaTriple::new(Label::Person, "HAS_TITLE", Label::Title),
            SchemaTriple::new(Label::Person, "TALKED_WITH", Label::Person),
            SchemaTriple::new(Label::Person, "TALKED_ABOUT", Label::Person),
            SchemaTriple::new(Label::Person, "STUDENT_OF", Label::Person),
            SchemaTriple::new(Label::Person, "WORKS_WITH", Label::Person),
        ];
        Self {
            label_renames,
            relation_renames,
            triples,
        }
    }
}

impl KgSchema {
    /// Checks relation tokens and rejects duplicate triples.
    ///
    /// # Errors
    /// - `InvalidRelationType` for a relation or rename target that is not an
    ///   upper snake case token
    /// - `DuplicateSchemaTriple` when a triple is listed twice
    /// - `InvalidConfig` when there are no triples
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.triples.is_empty() {
            return Err(ValidationError::InvalidConfig {
                reason: "schema must allow at least one triple".to_string(),
            });
        }
        for (from, to) in &self.relation_renames {
            check_relation_token(from)?;
            check_relation_token(to)?;
        }
        let mut seen = BTreeSet::new();
        for triple in &self.triples {
            check_relation_token(&triple.relation)?;
            if !seen.insert(triple) {
                return Err(ValidationError::DuplicateSchemaTriple {
                    source_label: triple.source.to_string(),
                    relation: triple.relation.clone(),
                    target_label: triple.target.to_string(),
                });
            }
        }
        Ok(self)
    }

    /// Applies the label rename table.
    #[must_use]
    pub fn rename_label<'a>(&'a self, label: &'a Label) -> &'a Label {
        self.label_renames.get(label).unwrap_or(label)
    }

    /// Applies the relation rename table.
    #[must_use]
    pub fn rename_relation<'a>(&'a self, rel_type: &'a str) -> &'a str {
        self.relation_renames.get(rel_type).map_or(rel_type, String::as_str)
    }

    /// Maps a mention-relation onto the schema.
    ///
    /// Returns the renamed triple if it is allowed, `None` otherwise.
    #[must_use]
    pub fn map_triple(&self, source: &Label, rel_type: &str, target: &Label) -> Option<&SchemaTriple> {
        let source = self.rename_label(source);
        let rel_type = self.rename_relation(rel_type);
        let target = self.rename_label(target);
        self.triples
            .iter()
            .find(|t| &t.source == source && t.relation == rel_type && &t.target == target)
    }

    /// Labels whose canonical nodes the KG Builder owns: the four resolved
    /// labels plus every label named by a triple.
    #[must_use]
    pub fn canonical_labels(&self) -> Vec<Label> {
        let mut labels: BTreeSet<Label> = [Label::Person, Label::Organization, Label::Occupation, Label::Title]
            .into_iter()
            .collect();
        for t in &self.triples {
            labels.insert(t.source.clone());
            labels.insert(t.target.clone());
        }
        labels.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schema_validates() {
        let schema = KgSchema::default().validate().unwrap();
        assert_eq!(schema.triples.len(), 7);
    }

    #[test]
    fn test_renames_then_filter() {
        let schema = KgSchema::default();
        let t = schema
            .map_triple(&Label::Person, "MENTIONS", &Label::Person)
            .unwrap();
        assert_eq!(t.relation, "TALKED_WITH");

        let t = schema
            .map_triple(&Label::Person, "WORKS_ON", &Label::Other("Technology".to_string()))
            .unwrap();
        assert_eq!(t.target, Label::Occupation);

        assert!(schema
            .map_triple(&Label::Occupation, "HAS_TITLE", &Label::Title)
            .is_none());
        assert!(schema
            .map_triple(&Label::Organization, "WORKS_FOR", &Label::Person)
            .is_none());
    }

    #[test]
    fn test_validate_rejects_bad_tokens() {
        let mut schema = KgSchema::default();
        schema.triples.push(SchemaTriple::new(Label::Person, "works for", Label::Organization));
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidRelationType { .. }));

        let mut schema = KgSchema::default();
        schema.relation_renames.insert("MET".to_string(), "talked".to_string());
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut schema = KgSchema::default();
        schema
            .triples
            .push(SchemaTriple::new(Label::Person, "WORKS_FOR", Label::Organization));
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateSchemaTriple { .. }));
    }

    #[test]
    fn test_schema_json_shape() {
        let json = serde_json::to_value(KgSchema::default()).unwrap();
        assert_eq!(json["triples"][0], serde_json::json!(["Person", "WORKS_FOR", "Organization"]));
        assert_eq!(json["label_renames"]["Technology"], "Occupation");

        let parsed: KgSchema = serde_json::from_value(serde_json::json!({
            "triples": [["person", "STUDENT_OF", "Person"]]
        }))
        .unwrap();
        assert_eq!(parsed.triples[0].source, Label::Person);
        assert_eq!(parsed.relation_renames, KgSchema::default().relation_renames);
    }

    #[test]
    fn test_canonical_labels_include_schema_labels() {
        let mut schema = KgSchema::default();
        schema
            .triples
            .push(SchemaTriple::new(Label::Person, "FUNDED_BY", Label::Other("Grant".to_string())));
        let labels = schema.canonical_labels();
        assert!(labels.contains(&Label::Other("Grant".to_string())));
        assert!(labels.contains(&Label::Title));
    }
}
