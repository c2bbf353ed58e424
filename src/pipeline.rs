//! The consolidation pipeline.
//!
//! `ConsolidationPipeline` owns the two stores and a validated configuration
//! and runs the stages in order: extraction (optional), resolution, KG build
//! and analysis. Every stage can be re-run from the mention store, so a
//! failed run is recovered by running again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{analyze, AnalysisReport};
use crate::config::PipelineConfig;
use crate::corpus::{CleanseReport, PageRecord, PageSelection};
use crate::error::KgResult;
use crate::extraction::{ExtractionReport, ExtractionRunner, Extractor};
use crate::kg::{BuildReport, KgBuilder, KnowledgeGraph};
use crate::resolution::{resolve, NameTable, ResolutionReport};
use crate::storage::{GraphStore, InMemoryGraphStore, InMemoryMentionStore, MentionStore};

/// Aggregated reports of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Absent when no extractor was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionReport>,
    /// Resolution stage counters.
    pub resolution: ResolutionReport,
    /// KG build counters.
    pub build: BuildReport,
    /// Components and ranking of the built graph.
    pub analysis: AnalysisReport,
}

/// Runs the consolidation stages against a mention store and a graph store.
pub struct ConsolidationPipeline {
    mentions: Arc<dyn MentionStore>,
    graph: Arc<dyn GraphStore>,
    config: PipelineConfig,
}

impl ConsolidationPipeline {
    /// Creates a pipeline over the given stores.
    ///
    /// # Errors
    /// Returns a validation error if `config` is invalid.
    pub fn new(
        mentions: Arc<dyn MentionStore>,
        graph: Arc<dyn GraphStore>,
        config: PipelineConfig,
    ) -> KgResult<Self> {
        Ok(Self {
            mentions,
            graph,
            config: config.validate()?,
        })
    }

    /// Creates a pipeline over fresh in-memory stores.
    ///
    /// # Errors
    /// Returns a validation error if `config` is invalid.
    pub fn in_memory(config: PipelineConfig) -> KgResult<Self> {
        Self::new(
            Arc::new(InMemoryMentionStore::new()),
            Arc::new(InMemoryGraphStore::new()),
            config,
        )
    }

    /// The validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The mention store.
    #[must_use]
    pub fn mention_store(&self) -> &dyn MentionStore {
        self.mentions.as_ref()
    }

    /// The graph store.
    #[must_use]
    pub fn graph_store(&self) -> &dyn GraphStore {
        self.graph.as_ref()
    }

    /// Adds segmented pages. Returns how many were new.
    ///
    /// # Errors
    /// Returns storage errors, including rejected page records.
    pub fn ingest(&self, pages: Vec<PageRecord>) -> KgResult<usize> {
        let added = self.mentions.add_pages(pages)?;
        tracing::info!(added, "pages ingested");
        Ok(added)
    }

    /// Extracts every pending page under the run label `run`.
    ///
    /// # Errors
    /// Returns storage errors; extraction failures only flag pages.
    pub fn extract(&self, extractor: &dyn Extractor, run: &str) -> KgResult<ExtractionReport> {
        self.extract_pages(extractor, run, PageSelection::Pending)
    }

    /// Extracts the pages picked by `selection` under the run label `run`.
    ///
    /// Re-extracting [`PageSelection::All`] under a fresh run and then calling
    /// [`cleanse`](Self::cleanse) with that run keeps only stable mentions.
    ///
    /// # Errors
    /// Returns storage errors; extraction failures only flag pages.
    pub fn extract_pages(
        &self,
        extractor: &dyn Extractor,
        run: &str,
        selection: PageSelection,
    ) -> KgResult<ExtractionReport> {
        ExtractionRunner::new(extractor, self.config.extraction.clone())?.run_selected(
            self.mentions.as_ref(),
            run,
            selection,
        )
    }

    /// Resolves names over the stored corpus, stores them and rebuilds the
    /// canonical graph.
    ///
    /// # Errors
    /// Returns storage errors.
    pub fn resolve_and_build(&self) -> KgResult<(ResolutionReport, BuildReport)> {
        let corpus = self.mentions.snapshot()?;
        let mut names = NameTable::seed(&corpus);
        let resolution = resolve(&corpus, &mut names, &self.config);
        self.mentions.store_names(names.export(&corpus))?;
        let build = KgBuilder::new(self.graph.as_ref(), &self.config).build(&corpus, &names)?;
        Ok((resolution, build))
    }

    /// Rebuilds the canonical graph from the names stored by the last
    /// resolution, without resolving again.
    ///
    /// # Errors
    /// Returns storage errors.
    pub fn rebuild_graph(&self) -> KgResult<BuildReport> {
        let corpus = self.mentions.snapshot()?;
        let stored = self.mentions.resolved_names()?;
        let names = NameTable::restore(&corpus, &stored);
        KgBuilder::new(self.graph.as_ref(), &self.config).build(&corpus, &names)
    }

    /// Removes mentions and relations not reproduced by `keep_run`.
    ///
    /// # Errors
    /// Returns storage errors.
    pub fn cleanse(&self, keep_run: &str) -> KgResult<CleanseReport> {
        let report = self.mentions.cleanse(keep_run)?;
        tracing::info!(
            keep_run,
            mentions = report.mentions_removed,
            relations = report.relations_removed,
            "corpus cleansed"
        );
        Ok(report)
    }

    /// Components and PageRank of the current canonical graph.
    ///
    /// # Errors
    /// Returns storage errors.
    pub fn analyze(&self) -> KgResult<AnalysisReport> {
        analyze(self.graph.as_ref(), &self.config.analysis)
    }

    /// The current canonical graph.
    ///
    /// # Errors
    /// Returns storage errors.
    pub fn graph(&self) -> KgResult<KnowledgeGraph> {
        Ok(self.graph.snapshot()?)
    }

    /// Runs every stage once. Extraction runs only when an extractor is
    /// given; its run label is the run id.
    ///
    /// # Errors
    /// Returns the first storage error; the run can be repeated from scratch.
    pub fn run(&self, extractor: Option<&dyn Extractor>) -> KgResult<PipelineReport> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let _span = tracing::info_span!("pipeline", run = %run_id).entered();

        let extraction = extractor
            .map(|e| self.extract(e, &run_id.to_string()))
            .transpose()?;
        let (resolution, build) = self.resolve_and_build()?;
        let analysis = self.analyze()?;

        let report = PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            extraction,
            resolution,
            build,
            analysis,
        };
        tracing::info!(
            nodes = report.build.nodes,
            relations = report.build.relations,
            classes = report.resolution.canonical.classes,
            "pipeline run finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractionError;
    use crate::mention::Label;

    fn page(id: &str, idx: u32) -> PageRecord {
        PageRecord {
            id: id.to_string(),
            page_idx: idx,
            text: format!("text of {id}"),
        }
    }

    fn extractor(page_id: &str, _: &str) -> Result<String, ExtractionError> {
        let payload = match page_id {
            "log_1" => {
                r#"{"entities": {"Person": [
                    {"id": "1", "name": "Captain James T. Kirk"},
                    {"id": "2", "name": "Spock", "titles": ["First Officer"]}
                ]}, "relations": {"talked to": [{"source": "1", "target": "2"}]}}"#
            }
            _ => {
                r#"{"entities": {"Person": [
                    {"id": "1", "name": "J. Kirk"},
                    {"id": "2", "name": "Spock"}
                ]}, "relations": {"MENTIONS": [{"source": "2", "target": "1"}]}}"#
            }
        };
        Ok(payload.to_string())
    }

    #[test]
    fn test_full_run() {
        let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
        assert_eq!(pipeline.ingest(vec![page("log_1", 1), page("log_2", 2)]).unwrap(), 2);

        let report = pipeline.run(Some(&extractor)).unwrap();
        let extraction = report.extraction.unwrap();
        assert_eq!(extraction.pages_processed, 2);
        assert!(report.finished_at >= report.started_at);

        let graph = pipeline.graph().unwrap();
        let spock = graph.node(&Label::Person, "Spock").unwrap();
        assert_eq!(spock.count, 2);
        assert_eq!(graph.relations_of_type("TALKED_WITH").count(), 2);
        assert!(graph.node(&Label::Title, "First Officer").is_some());
    }

    #[test]
    fn test_rebuild_uses_stored_names() {
        let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
        pipeline.ingest(vec![page("log_1", 1), page("log_2", 2)]).unwrap();
        pipeline.run(Some(&extractor)).unwrap();
        let first = pipeline.graph().unwrap();

        pipeline.rebuild_graph().unwrap();
        assert_eq!(pipeline.graph().unwrap(), first);
    }

    #[test]
    fn test_run_without_extractor_is_idempotent() {
        let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
        pipeline.ingest(vec![page("log_1", 1)]).unwrap();
        pipeline.extract(&extractor, "run-a").unwrap();

        let first = pipeline.run(None).unwrap();
        let graph = pipeline.graph().unwrap();
        let second = pipeline.run(None).unwrap();
        assert!(second.extraction.is_none());
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(pipeline.graph().unwrap(), graph);
        assert_eq!(first.build.nodes, second.build.nodes);
        assert_eq!(second.build.nodes_deleted, first.build.nodes);
    }

    #[test]
    fn test_cleanse_drops_unreproduced() {
        let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
        pipeline.ingest(vec![page("log_1", 1)]).unwrap();
        pipeline.extract(&extractor, "run-a").unwrap();

        let report = pipeline.cleanse("run-b").unwrap();
        assert!(report.mentions_removed > 0);
        assert!(pipeline.mention_store().snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.analysis.damping = 2.0;
        assert!(ConsolidationPipeline::in_memory(config).is_err());
    }
}
