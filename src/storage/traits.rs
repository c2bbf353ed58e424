//! Abstract storage traits for kyrokg.
//!
//! These traits define the contract with the two storage collaborators of the
//! pipeline:
//! - the mention store, holding pages and per-page mentions with provenance
//! - the graph store, holding the canonical knowledge graph
//!
//! Both are object safe and `Send + Sync` so a pipeline can hold them behind
//! `Arc<dyn ...>`.

use std::collections::HashMap;

use thiserror::Error;

use crate::corpus::{CleanseReport, Corpus, Page, PageRecord, PageSelection, RecordOutcome};
use crate::error::ValidationError;
use crate::extraction::Extraction;
use crate::kg::{
    CanonicalEntity, CanonicalRelation, KnowledgeGraph, MentionMapping, NodeKey, RelationKey,
    SimilarityEdge,
};
use crate::mention::{Label, MentionId};
use crate::resolution::{DisjointSet, ResolvedNames};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Page not found.
    #[error("Page not found: {0}")]
    PageNotFound(String),

    /// Canonical node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    /// The store refused a malformed write.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Backend error.
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Stored data failed an integrity check.
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    /// Another process holds the store.
    #[error("Store is locked: {0}")]
    Locked(String),

    /// Connection failed.
    #[error("Connection error: {0}")]
    ConnectionError(String),
}

impl From<ValidationError> for StorageError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownPage { page_id } => Self::PageNotFound(page_id),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Storage trait for pages and their mentions.
///
/// Writes merge by key: re-recording the same payload under a new run only
/// adds the run to the existing mentions and relations.
pub trait MentionStore: Send + Sync {
    /// Adds pages (or refreshes existing ones). Returns the number of pages
    /// that were new.
    fn add_pages(&self, pages: Vec<PageRecord>) -> Result<usize, StorageError>;

    /// Pages picked by `selection`, ordered by page index.
    fn select_pages(&self, selection: PageSelection) -> Result<Vec<Page>, StorageError>;

    /// Pages still waiting for a usable extraction, ordered by page index.
    fn pending_pages(&self) -> Result<Vec<Page>, StorageError> {
        self.select_pages(PageSelection::Pending)
    }

    /// Stores a parsed payload for a page under `run` and marks it processed.
    ///
    /// # Errors
    /// - `PageNotFound`: if the page was never added
    fn record_extraction(
        &self,
        page_id: &str,
        extraction: &Extraction,
        run: &str,
    ) -> Result<RecordOutcome, StorageError>;

    /// Flags a page whose extraction could not be used.
    ///
    /// # Errors
    /// - `PageNotFound`: if the page was never added
    fn mark_failed(&self, page_id: &str, reason: &str) -> Result<(), StorageError>;

    /// Returns a consistent copy of the whole corpus.
    fn snapshot(&self) -> Result<Corpus, StorageError>;

    /// Removes mentions and relations not reproduced in `keep_run`.
    fn cleanse(&self, keep_run: &str) -> Result<CleanseReport, StorageError>;

    /// Replaces the stored normalized names.
    fn store_names(&self, names: ResolvedNames) -> Result<(), StorageError>;

    /// Normalized names written by the last resolution run.
    fn resolved_names(&self) -> Result<ResolvedNames, StorageError>;
}

/// Storage trait for the canonical graph.
///
/// The merge operations are upserts keyed by identity: when the key is
/// absent, `defaults` is inserted first; `update` is then applied to the
/// stored value. Running the same merge twice applies `update` twice, so
/// callers that need idempotence rebuild from a reset.
pub trait GraphStore: Send + Sync {
    /// Upserts a canonical node and returns its state after `update`.
    fn merge_node(
        &self,
        key: &NodeKey,
        defaults: CanonicalEntity,
        update: &mut dyn FnMut(&mut CanonicalEntity),
    ) -> Result<CanonicalEntity, StorageError>;

    /// Upserts a canonical relation and returns its state after `update`.
    ///
    /// # Errors
    /// - `NodeNotFound`: if either endpoint was not merged before
    fn merge_relation(
        &self,
        key: &RelationKey,
        defaults: CanonicalRelation,
        update: &mut dyn FnMut(&mut CanonicalRelation),
    ) -> Result<CanonicalRelation, StorageError>;

    /// Adds a similarity edge. Returns false if it already existed.
    ///
    /// # Errors
    /// - `NodeNotFound`: if either endpoint does not exist
    fn merge_similarity(&self, edge: SimilarityEdge) -> Result<bool, StorageError>;

    /// Records that a mention was merged into a node. Returns false if the
    /// link already existed.
    ///
    /// # Errors
    /// - `NodeNotFound`: if the node does not exist
    fn merge_mapping(&self, mention: &MentionId, node: &NodeKey) -> Result<bool, StorageError>;

    /// Deletes every node carrying one of `labels` together with the
    /// relations, similarity edges and mappings touching them. Returns the
    /// number of nodes deleted.
    fn delete_labels(&self, labels: &[Label]) -> Result<usize, StorageError>;

    /// Gets a node by key.
    fn get_node(&self, key: &NodeKey) -> Result<Option<CanonicalEntity>, StorageError>;

    /// All nodes, sorted by key.
    fn nodes(&self) -> Result<Vec<CanonicalEntity>, StorageError>;

    /// All relations, sorted by key.
    fn relations(&self) -> Result<Vec<CanonicalRelation>, StorageError>;

    /// All similarity edges, sorted.
    fn similarities(&self) -> Result<Vec<SimilarityEdge>, StorageError>;

    /// All mention-to-node mappings, sorted.
    fn mappings(&self) -> Result<Vec<MentionMapping>, StorageError>;

    /// Weakly connected components of the graph induced by `edges`.
    ///
    /// Every node touched by an edge receives a component id; ids are dense,
    /// starting at 0, ordered by each component's smallest key.
    fn connected_components(
        &self,
        edges: &[(NodeKey, NodeKey)],
    ) -> Result<HashMap<NodeKey, usize>, StorageError> {
        let mut keys: Vec<&NodeKey> = edges.iter().flat_map(|(a, b)| [a, b]).collect();
        keys.sort();
        keys.dedup();
        let index: HashMap<&NodeKey, usize> = keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();

        let mut forest = DisjointSet::new(keys.len());
        for (a, b) in edges {
            forest.union(index[a], index[b]);
        }

        let mut out = HashMap::with_capacity(keys.len());
        for (component, members) in forest.groups(|_| true).into_iter().enumerate() {
            for member in members {
                out.insert(keys[member].clone(), component);
            }
        }
        Ok(out)
    }

    /// Returns the whole graph as one sorted snapshot.
    fn snapshot(&self) -> Result<KnowledgeGraph, StorageError> {
        let mut graph = KnowledgeGraph {
            nodes: self.nodes()?,
            relations: self.relations()?,
            similarities: self.similarities()?,
            mappings: self.mappings()?,
        };
        graph.sort();
        Ok(graph)
    }
}
