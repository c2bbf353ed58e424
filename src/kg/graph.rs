//! Canonical graph types.
//!
//! Canonical entities and relations are what the KG Builder produces. They
//! are identified by merge keys, never by insertion order, so rebuilding the
//! graph from the same mentions yields the same keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mention::{Label, MentionId, RelationId};

/// Identity of a canonical entity: `(label, lower(normalized_name))`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// Label after renaming.
    pub label: Label,
    /// Lower-cased canonical name.
    pub name: String,
}

impl NodeKey {
    /// Builds the key for a normalized name under a label.
    #[must_use]
    pub fn new(label: Label, normalized_name: &str) -> Self {
        Self {
            label,
            name: normalized_name.to_lowercase(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.label, self.name)
    }
}

/// A deduplicated, schema-conformant node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEntity {
    /// Node identity.
    pub key: NodeKey,

    /// Representative spelling: the normalized name of the first mention
    /// merged into this node.
    pub name: String,

    /// Number of mentions merged into this node.
    pub count: u64,

    /// Titles of the last merged mention that carried any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub titles: Vec<String>,

    /// Sub-type of the last merged mention that carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

impl CanonicalEntity {
    /// Creation defaults for a node first seen under `name`.
    #[must_use]
    pub fn new(key: NodeKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            count: 0,
            titles: Vec::new(),
            entity_type: None,
        }
    }

    /// The node's label.
    #[must_use]
    pub fn label(&self) -> &Label {
        &self.key.label
    }
}

/// Identity of a canonical relation: `(source, type, target)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationKey {
    /// Source node.
    pub source: NodeKey,
    /// Relation type after renaming.
    pub rel_type: String,
    /// Target node.
    pub target: NodeKey,
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})-[{}]->({})", self.source, self.rel_type, self.target)
    }
}

/// A canonical edge aggregating one or more mention-relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRelation {
    /// Edge identity.
    pub key: RelationKey,

    /// Number of mention-relations merged into this edge.
    pub count: u64,

    /// Contributing mention-relations, in merge order.
    pub orig_ids: Vec<RelationId>,

    /// Sentiment of the last merged mention-relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,

    /// Conversation type of the last merged mention-relation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_type: Option<String>,
}

impl CanonicalRelation {
    /// Creation defaults: zero count and no contributors.
    #[must_use]
    pub fn new(key: RelationKey) -> Self {
        Self {
            key,
            count: 0,
            orig_ids: Vec::new(),
            sentiment: None,
            conversation_type: None,
        }
    }
}

/// Kind of containment-based similarity edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimilarityKind {
    /// Between Organization nodes.
    SimilarOrganization,
    /// Between Occupation nodes.
    SimilarOccupation,
}

impl SimilarityKind {
    /// The label this kind of similarity applies to.
    #[must_use]
    pub const fn label(self) -> Label {
        match self {
            Self::SimilarOrganization => Label::Organization,
            Self::SimilarOccupation => Label::Occupation,
        }
    }

    /// Relationship type name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimilarOrganization => "SIMILAR_ORGANIZATION",
            Self::SimilarOccupation => "SIMILAR_OCCUPATION",
        }
    }
}

/// A directed "similar" edge: `from`'s name contains `to`'s name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimilarityEdge {
    /// Node whose name contains the other's.
    pub from: NodeKey,
    /// Node whose name is contained.
    pub to: NodeKey,
    /// Organization or Occupation similarity.
    pub kind: SimilarityKind,
}

/// Link from a contributing mention to the canonical node it was merged into.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MentionMapping {
    /// Contributing mention.
    pub mention: MentionId,
    /// Node it was merged into.
    pub node: NodeKey,
}

/// A full, serializable snapshot of the canonical graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    /// Nodes sorted by key.
    pub nodes: Vec<CanonicalEntity>,
    /// Relations sorted by key.
    pub relations: Vec<CanonicalRelation>,
    /// Similarity edges, sorted.
    #[serde(default)]
    pub similarities: Vec<SimilarityEdge>,
    /// Mention-to-node mappings, sorted.
    #[serde(default)]
    pub mappings: Vec<MentionMapping>,
}

impl KnowledgeGraph {
    /// Looks up a node by label and (case-insensitive) name.
    #[must_use]
    pub fn node(&self, label: &Label, name: &str) -> Option<&CanonicalEntity> {
        let key = NodeKey::new(label.clone(), name);
        self.nodes.iter().find(|n| n.key == key)
    }

    /// Returns all relations of a type.
    #[must_use]
    pub fn relations_of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a CanonicalRelation> + 'a {
        self.relations.iter().filter(move |r| r.key.rel_type == rel_type)
    }

    /// Returns all nodes carrying a label.
    #[must_use]
    pub fn nodes_with_label<'a>(&'a self, label: &'a Label) -> impl Iterator<Item = &'a CanonicalEntity> + 'a {
        self.nodes.iter().filter(move |n| &n.key.label == label)
    }

    /// Sorts every collection by key so snapshots compare and diff cleanly.
    pub fn sort(&mut self) {
        self.nodes.sort_by(|a, b| a.key.cmp(&b.key));
        self.relations.sort_by(|a, b| a.key.cmp(&b.key));
        self.similarities.sort();
        self.mappings.sort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_lowercases() {
        let key = NodeKey::new(Label::Person, "George E. Hale");
        assert_eq!(key.name, "george e. hale");
        assert_eq!(key, NodeKey::new(Label::Person, "GEORGE E. HALE"));
        assert_ne!(key, NodeKey::new(Label::Organization, "George E. Hale"));
        assert_eq!(key.to_string(), "Person:george e. hale");
    }

    #[test]
    fn test_similarity_kind_names() {
        assert_eq!(SimilarityKind::SimilarOccupation.as_str(), "SIMILAR_OCCUPATION");
        assert_eq!(SimilarityKind::SimilarOrganization.label(), Label::Organization);
        let json = serde_json::to_string(&SimilarityKind::SimilarOrganization).unwrap();
        assert_eq!(json, "\"SIMILAR_ORGANIZATION\"");
    }

    #[test]
    fn test_knowledge_graph_lookup() {
        let key = NodeKey::new(Label::Person, "Hale");
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(CanonicalEntity::new(key, "Hale"));
        assert!(graph.node(&Label::Person, "HALE").is_some());
        assert!(graph.node(&Label::Title, "Hale").is_none());
        assert_eq!(graph.nodes_with_label(&Label::Person).count(), 1);
    }
}
