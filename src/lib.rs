//! # KyroKG - Mention Consolidation into a Canonical Knowledge Graph
//!
//! KyroKG takes entity and relation mentions extracted page by page from a
//! document corpus and consolidates them into a deduplicated knowledge graph.
//!
//! ## Core Concepts
//!
//! - **Mention**: one occurrence of a named thing on a page, with provenance
//! - **Resolution**: normalization, proximity, similarity and corroboration
//!   stages that agree on one canonical name per real-world entity
//! - **Canonical graph**: schema-conformant nodes and relations keyed by
//!   `(label, name)`, with occurrence counts and contributing ids
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kyrokg::{ConsolidationPipeline, PageRecord, PipelineConfig};
//!
//! let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default())?;
//! pipeline.ingest(vec![PageRecord { id: "diary_1".into(), page_idx: 1, text }])?;
//! let report = pipeline.run(Some(&my_extractor))?;
//! let graph = pipeline.graph()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod config;
pub mod corpus;
pub mod error;
pub mod mention;
pub mod schema;

// Stages
pub mod analysis;
pub mod extraction;
pub mod kg;
pub mod pipeline;
pub mod resolution;
pub mod storage;

pub use analysis::{analyze, AnalysisReport, RankedNode};
pub use config::{
    AnalysisConfig, ContainmentConfig, CorroborationConfig, ExtractionConfig, NodeCountMode,
    NormalizerConfig, PipelineConfig,
};
pub use corpus::{Corpus, Page, PageRecord, PageSelection, PageStatus};
pub use error::{ExtractionError, KgError, KgResult, ValidationError};
pub use extraction::{parse_extraction, Extraction, ExtractionReport, ExtractionRunner, Extractor};
pub use kg::{
    BuildReport, CanonicalEntity, CanonicalRelation, KgBuilder, KnowledgeGraph, NodeKey, RelationKey,
    SimilarityEdge, SimilarityKind,
};
pub use mention::{Label, Mention, MentionId, MentionIdx, Provenance};
pub use pipeline::{ConsolidationPipeline, PipelineReport};
pub use resolution::{resolve, NameTable, ResolutionReport, ResolvedNames};
pub use schema::{KgSchema, SchemaTriple};
pub use storage::{GraphStore, InMemoryGraphStore, InMemoryMentionStore, MentionStore, StorageError};
