//! KG Builder: full rebuild of the canonical graph from resolved mentions.
//!
//! A build is a reset followed by merge-by-key upserts, so running it twice
//! over the same names produces the same graph.

use serde::{Deserialize, Serialize};

use crate::config::{ContainmentConfig, NodeCountMode, PipelineConfig};
use crate::corpus::Corpus;
use crate::error::KgResult;
use crate::kg::{CanonicalEntity, CanonicalRelation, NodeKey, RelationKey, SimilarityEdge, SimilarityKind};
use crate::mention::{Label, Mention, MentionRelation};
use crate::resolution::NameTable;
use crate::schema::KgSchema;
use crate::storage::GraphStore;

/// Counters of one KG build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Canonical nodes removed by the reset.
    pub nodes_deleted: usize,
    /// Mention-relations merged into canonical relations.
    pub relations_merged: usize,
    /// Mention-relations whose triple is not in the schema.
    pub schema_dropped: usize,
    /// Mention-relations with an endpoint missing from their page.
    pub dangling: usize,
    /// Canonical nodes after the build.
    pub nodes: usize,
    /// Canonical relations after the build.
    pub relations: usize,
    /// Similarity edges between canonical nodes.
    pub similarity_edges: usize,
    /// Mention-to-node mappings recorded.
    pub mappings: usize,
}

/// Builds the canonical graph into a [`GraphStore`].
pub struct KgBuilder<'a> {
    store: &'a dyn GraphStore,
    schema: &'a KgSchema,
    containment: &'a ContainmentConfig,
    count_mode: NodeCountMode,
}

impl<'a> KgBuilder<'a> {
    /// Creates a builder writing into `store` with the schema and rules of `config`.
    #[must_use]
    pub fn new(store: &'a dyn GraphStore, config: &'a PipelineConfig) -> Self {
        Self {
            store,
            schema: &config.schema,
            containment: &config.containment,
            count_mode: config.node_count,
        }
    }

    /// Rebuilds the canonical graph from `corpus` under the resolved `names`.
    ///
    /// # Errors
    /// Propagates store failures. Schema mismatches and dangling relations
    /// are counted in the report, not returned.
    pub fn build(&self, corpus: &Corpus, names: &NameTable) -> KgResult<BuildReport> {
        let _span = tracing::info_span!("kg_build").entered();
        let mut report = BuildReport {
            nodes_deleted: self.store.delete_labels(&self.schema.canonical_labels())?,
            ..BuildReport::default()
        };

        for rel in corpus.relations() {
            let Some((source, target)) = endpoints(corpus, rel) else {
                tracing::warn!(relation = %rel.id, rel_type = %rel.rel_type, "dangling mention-relation skipped");
                report.dangling += 1;
                continue;
            };
            let Some(triple) = self.schema.map_triple(&source.label, &rel.rel_type, &target.label) else {
                tracing::debug!(
                    source = %source.label,
                    rel_type = %rel.rel_type,
                    target = %target.label,
                    "triple not in schema"
                );
                report.schema_dropped += 1;
                continue;
            };

            let source_key = self.merge_endpoint(source, &triple.source, names.get(rel.source))?;
            let target_key = self.merge_endpoint(target, &triple.target, names.get(rel.target))?;
            self.merge_relation(rel, source_key, &triple.relation, target_key)?;
            report.relations_merged += 1;
        }

        report.similarity_edges = self.merge_similarities()?;
        report.nodes = self.store.nodes()?.len();
        report.relations = self.store.relations()?.len();
        report.mappings = self.store.mappings()?.len();

        tracing::info!(
            nodes = report.nodes,
            relations = report.relations,
            merged = report.relations_merged,
            schema_dropped = report.schema_dropped,
            dangling = report.dangling,
            similarity_edges = report.similarity_edges,
            "knowledge graph built"
        );
        Ok(report)
    }

    fn merge_endpoint(&self, mention: &Mention, label: &Label, name: &str) -> KgResult<NodeKey> {
        let key = NodeKey::new(label.clone(), name);
        let per_relation = self.count_mode == NodeCountMode::Relations;

        self.store.merge_node(&key, CanonicalEntity::new(key.clone(), name), &mut |node| {
            if per_relation {
                node.count += 1;
            }
            if !mention.titles.is_empty() {
                node.titles.clone_from(&mention.titles);
            }
            if mention.entity_type.is_some() {
                node.entity_type.clone_from(&mention.entity_type);
            }
        })?;

        let first_time = self.store.merge_mapping(&mention.id, &key)?;
        if first_time && !per_relation {
            self.store
                .merge_node(&key, CanonicalEntity::new(key.clone(), name), &mut |node| node.count += 1)?;
        }
        Ok(key)
    }

    fn merge_relation(
        &self,
        rel: &MentionRelation,
        source: NodeKey,
        rel_type: &str,
        target: NodeKey,
    ) -> KgResult<()> {
        let key = RelationKey {
            source,
            rel_type: rel_type.to_string(),
            target,
        };
        self.store
            .merge_relation(&key, CanonicalRelation::new(key.clone()), &mut |edge| {
                edge.count += 1;
                edge.orig_ids.push(rel.id.clone());
                edge.sentiment.clone_from(&rel.sentiment);
                edge.conversation_type.clone_from(&rel.conversation_type);
            })?;
        Ok(())
    }

    fn merge_similarities(&self) -> KgResult<usize> {
        let nodes = self.store.nodes()?;
        let mut added = 0;
        for kind in [SimilarityKind::SimilarOrganization, SimilarityKind::SimilarOccupation] {
            let label = kind.label();
            let members: Vec<&NodeKey> = nodes.iter().map(|n| &n.key).filter(|k| k.label == label).collect();
            for from in &members {
                for to in &members {
                    if from != to && self.containment.is_similar(kind, &from.name, &to.name) {
                        let edge = SimilarityEdge {
                            from: (*from).clone(),
                            to: (*to).clone(),
                            kind,
                        };
                        if self.store.merge_similarity(edge)? {
                            added += 1;
                        }
                    }
                }
            }
        }
        Ok(added)
    }
}

/// Both endpoints of a mention-relation, if they exist on the relation's page.
fn endpoints<'c>(corpus: &'c Corpus, rel: &MentionRelation) -> Option<(&'c Mention, &'c Mention)> {
    let source = corpus.mention(rel.source)?;
    let target = corpus.mention(rel.target)?;
    (source.provenance.page_id == target.provenance.page_id).then_some((source, target))
}
