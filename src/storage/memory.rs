//! In-memory storage backend.
//!
//! Thread-safe implementations of the storage traits, intended for embedded
//! usage, tests, and as the reference implementation of the merge semantics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use crate::corpus::{CleanseReport, Corpus, Page, PageRecord, PageSelection, RecordOutcome};
use crate::extraction::Extraction;
use crate::kg::{
    CanonicalEntity, CanonicalRelation, KnowledgeGraph, MentionMapping, NodeKey, RelationKey,
    SimilarityEdge,
};
use crate::mention::{Label, MentionId};
use crate::resolution::ResolvedNames;
use crate::storage::traits::{GraphStore, MentionStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct MentionState {
    corpus: Corpus,
    names: ResolvedNames,
}

/// Thread-safe in-memory mention store.
#[derive(Debug, Default)]
pub struct InMemoryMentionStore {
    state: RwLock<MentionState>,
}

impl InMemoryMentionStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding an existing corpus snapshot.
    #[must_use]
    pub fn from_corpus(corpus: Corpus) -> Self {
        Self {
            state: RwLock::new(MentionState {
                corpus,
                names: ResolvedNames::default(),
            }),
        }
    }
}

impl MentionStore for InMemoryMentionStore {
    fn add_pages(&self, pages: Vec<PageRecord>) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mention.add_pages"))?;
        let mut added = 0;
        for record in pages {
            let is_new = state.corpus.page(&record.id).is_none();
            state.corpus.add_page(record)?;
            if is_new {
                added += 1;
            }
        }
        Ok(added)
    }

    fn select_pages(&self, selection: PageSelection) -> Result<Vec<Page>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("mention.select_pages"))?;
        Ok(state
            .corpus
            .select_pages(selection)
            .into_iter()
            .cloned()
            .collect())
    }

    fn record_extraction(
        &self,
        page_id: &str,
        extraction: &Extraction,
        run: &str,
    ) -> Result<RecordOutcome, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mention.record_extraction"))?;
        Ok(state.corpus.record_extraction(page_id, extraction, run)?)
    }

    fn mark_failed(&self, page_id: &str, reason: &str) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mention.mark_failed"))?;
        Ok(state.corpus.mark_failed(page_id, reason)?)
    }

    fn snapshot(&self) -> Result<Corpus, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("mention.snapshot"))?;
        Ok(state.corpus.clone())
    }

    fn cleanse(&self, keep_run: &str) -> Result<CleanseReport, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mention.cleanse"))?;
        Ok(state.corpus.cleanse(keep_run))
    }

    fn store_names(&self, names: ResolvedNames) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("mention.store_names"))?;
        state.names = names;
        Ok(())
    }

    fn resolved_names(&self) -> Result<ResolvedNames, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("mention.resolved_names"))?;
        Ok(state.names.clone())
    }
}

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<NodeKey, CanonicalEntity>,
    relations: BTreeMap<RelationKey, CanonicalRelation>,
    similarities: BTreeSet<SimilarityEdge>,
    mappings: BTreeSet<MentionMapping>,
}

impl GraphState {
    fn require_node(&self, key: &NodeKey) -> Result<(), StorageError> {
        if self.nodes.contains_key(key) {
            Ok(())
        } else {
            Err(StorageError::NodeNotFound(key.clone()))
        }
    }
}

/// Thread-safe in-memory canonical graph store.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding a previously built graph.
    ///
    /// Relations, similarity edges and mappings whose endpoints are missing
    /// from `graph.nodes` are skipped.
    #[must_use]
    pub fn from_graph(graph: KnowledgeGraph) -> Self {
        let mut state = GraphState::default();
        for node in graph.nodes {
            state.nodes.insert(node.key.clone(), node);
        }
        for rel in graph.relations {
            if state.nodes.contains_key(&rel.key.source) && state.nodes.contains_key(&rel.key.target) {
                state.relations.insert(rel.key.clone(), rel);
            }
        }
        state.similarities = graph
            .similarities
            .into_iter()
            .filter(|e| state.nodes.contains_key(&e.from) && state.nodes.contains_key(&e.to))
            .collect();
        state.mappings = graph
            .mappings
            .into_iter()
            .filter(|m| state.nodes.contains_key(&m.node))
            .collect();
        Self {
            state: RwLock::new(state),
        }
    }
}

impl GraphStore for InMemoryGraphStore {
    fn merge_node(
        &self,
        key: &NodeKey,
        defaults: CanonicalEntity,
        update: &mut dyn FnMut(&mut CanonicalEntity),
    ) -> Result<CanonicalEntity, StorageError> {
        if &defaults.key != key {
            return Err(StorageError::InvalidInput(format!(
                "node defaults keyed {} merged under {key}",
                defaults.key
            )));
        }
        let mut state = self.state.write().map_err(|_| lock_err("graph.merge_node"))?;
        let node = state.nodes.entry(key.clone()).or_insert(defaults);
        update(node);
        node.key = key.clone();
        Ok(node.clone())
    }

    fn merge_relation(
        &self,
        key: &RelationKey,
        defaults: CanonicalRelation,
        update: &mut dyn FnMut(&mut CanonicalRelation),
    ) -> Result<CanonicalRelation, StorageError> {
        if &defaults.key != key {
            return Err(StorageError::InvalidInput(format!(
                "relation defaults keyed {} merged under {key}",
                defaults.key
            )));
        }
        let mut state = self.state.write().map_err(|_| lock_err("graph.merge_relation"))?;
        state.require_node(&key.source)?;
        state.require_node(&key.target)?;
        let rel = state.relations.entry(key.clone()).or_insert(defaults);
        update(rel);
        rel.key = key.clone();
        Ok(rel.clone())
    }

    fn merge_similarity(&self, edge: SimilarityEdge) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.merge_similarity"))?;
        state.require_node(&edge.from)?;
        state.require_node(&edge.to)?;
        Ok(state.similarities.insert(edge))
    }

    fn merge_mapping(&self, mention: &MentionId, node: &NodeKey) -> Result<bool, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.merge_mapping"))?;
        state.require_node(node)?;
        Ok(state.mappings.insert(MentionMapping {
            mention: mention.clone(),
            node: node.clone(),
        }))
    }

    fn delete_labels(&self, labels: &[Label]) -> Result<usize, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("graph.delete_labels"))?;
        let before = state.nodes.len();
        state.nodes.retain(|key, _| !labels.contains(&key.label));
        let deleted = before - state.nodes.len();

        let GraphState {
            nodes,
            relations,
            similarities,
            mappings,
        } = &mut *state;
        relations.retain(|key, _| nodes.contains_key(&key.source) && nodes.contains_key(&key.target));
        similarities.retain(|e| nodes.contains_key(&e.from) && nodes.contains_key(&e.to));
        mappings.retain(|m| nodes.contains_key(&m.node));
        Ok(deleted)
    }

    fn get_node(&self, key: &NodeKey) -> Result<Option<CanonicalEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.get_node"))?;
        Ok(state.nodes.get(key).cloned())
    }

    fn nodes(&self) -> Result<Vec<CanonicalEntity>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.nodes"))?;
        Ok(state.nodes.values().cloned().collect())
    }

    fn relations(&self) -> Result<Vec<CanonicalRelation>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.relations"))?;
        Ok(state.relations.values().cloned().collect())
    }

    fn similarities(&self) -> Result<Vec<SimilarityEdge>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.similarities"))?;
        Ok(state.similarities.iter().cloned().collect())
    }

    fn mappings(&self) -> Result<Vec<MentionMapping>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("graph.mappings"))?;
        Ok(state.mappings.iter().cloned().collect())
    }
}
