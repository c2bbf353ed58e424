//! The canonical knowledge graph and its builder.

mod builder;
mod graph;

pub use builder::{BuildReport, KgBuilder};
pub use graph::{
    CanonicalEntity, CanonicalRelation, KnowledgeGraph, MentionMapping, NodeKey, RelationKey,
    SimilarityEdge, SimilarityKind,
};
