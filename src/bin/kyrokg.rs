//! kyrokg command-line interface.
//!
//! ```bash
//! # Add pages to a store and extract them from pre-computed payloads
//! kyrokg ingest --store ./diaries.kykg --pages pages.json --payloads ./payloads
//!
//! # Resolve and build the canonical graph
//! kyrokg consolidate --store ./diaries.kykg --output graph.json --report report.json
//!
//! # Re-extract every page under a second run, then drop what it did not reproduce
//! kyrokg ingest --store ./diaries.kykg --pages pages.json --payloads ./payloads-2 --run check --all
//! kyrokg cleanse --store ./diaries.kykg --keep-run check
//!
//! # Components and PageRank of a built graph
//! kyrokg analyze --graph graph.json --top 20
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use kyrokg::storage::persistent::open_mention_store;
use kyrokg::{
    analyze, ConsolidationPipeline, Corpus, ExtractionError, Extractor, InMemoryGraphStore,
    InMemoryMentionStore, KgError, KgResult, KnowledgeGraph, MentionStore, PageRecord, PageSelection,
    PipelineConfig, ValidationError,
};

/// Consolidate extracted mentions into a canonical knowledge graph.
#[derive(Parser, Debug)]
#[command(name = "kyrokg", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add pages to a store and extract them from payload files.
    Ingest {
        /// Store directory.
        #[arg(long)]
        store: PathBuf,
        /// JSON array of `{id, page_idx, text}` records.
        #[arg(long)]
        pages: PathBuf,
        /// Directory holding one `<page id>.json` extractor output per page.
        #[arg(long)]
        payloads: PathBuf,
        /// Run label recorded on extracted mentions (default: a new UUID).
        #[arg(long)]
        run: Option<String>,
        /// Re-extract processed pages too, for a later `cleanse --keep-run`.
        #[arg(long)]
        all: bool,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Resolve names and build the canonical graph.
    Consolidate {
        #[command(flatten)]
        source: CorpusSource,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Where to write the graph (default: stdout).
        #[arg(long)]
        output: Option<PathBuf>,
        /// Where to write the run report.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Remove mentions and relations not reproduced by a run.
    Cleanse {
        #[command(flatten)]
        source: CorpusSource,
        #[arg(long)]
        keep_run: String,
        /// Where to write the cleansed corpus when reading `--corpus`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Connected components and PageRank of a built graph.
    Analyze {
        /// Graph JSON written by `consolidate`.
        #[arg(long)]
        graph: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of ranked people to print.
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct CorpusSource {
    /// Corpus snapshot JSON.
    #[arg(long)]
    corpus: Option<PathBuf>,
    /// Persistent store directory.
    #[arg(long)]
    store: Option<PathBuf>,
}

/// Replays extractor outputs saved as files.
struct PayloadDir {
    dir: PathBuf,
}

impl Extractor for PayloadDir {
    fn extract(&self, page_id: &str, _text: &str) -> Result<String, ExtractionError> {
        let path = self.dir.join(format!("{page_id}.json"));
        fs::read_to_string(&path).map_err(|e| ExtractionError::CallFailed {
            message: format!("cannot read {}: {e}", path.display()),
            retryable: false,
        })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> KgResult<T> {
    let text = fs::read_to_string(path)
        .map_err(|e| KgError::internal(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| {
        ValidationError::InvalidConfig {
            reason: format!("{} is not valid: {e}", path.display()),
        }
        .into()
    })
}

fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> KgResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| KgError::internal(format!("cannot serialize output: {e}")))?;
    match path {
        Some(path) => fs::write(path, json)
            .map_err(|e| KgError::internal(format!("cannot write {}: {e}", path.display()))),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> KgResult<PipelineConfig> {
    path.map_or_else(|| PipelineConfig::default().validate(), PipelineConfig::from_json_file)
}

fn open_source(source: &CorpusSource) -> KgResult<Arc<dyn MentionStore>> {
    match (&source.corpus, &source.store) {
        (Some(corpus), _) => {
            let corpus: Corpus = read_json(corpus)?;
            Ok(Arc::new(InMemoryMentionStore::from_corpus(corpus)))
        }
        (None, Some(store)) => Ok(Arc::new(open_mention_store(store, None)?)),
        (None, None) => Err(ValidationError::MissingField {
            field: "--corpus or --store".to_string(),
        }
        .into()),
    }
}

fn run(cli: Cli) -> KgResult<()> {
    match cli.command {
        Command::Ingest {
            store,
            pages,
            payloads,
            run,
            all,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let mentions: Arc<dyn MentionStore> = Arc::new(open_mention_store(&store, None)?);
            let pipeline = ConsolidationPipeline::new(mentions, Arc::new(InMemoryGraphStore::new()), config)?;

            let records: Vec<PageRecord> = read_json(&pages)?;
            pipeline.ingest(records)?;
            let run = run.unwrap_or_else(|| Uuid::new_v4().to_string());
            let selection = if all { PageSelection::All } else { PageSelection::Pending };
            let report = pipeline.extract_pages(&PayloadDir { dir: payloads }, &run, selection)?;
            write_json(&report, None)
        }
        Command::Consolidate {
            source,
            config,
            output,
            report,
        } => {
            let config = load_config(config.as_deref())?;
            let pipeline = ConsolidationPipeline::new(open_source(&source)?, Arc::new(InMemoryGraphStore::new()), config)?;
            let run_report = pipeline.run(None)?;
            write_json(&pipeline.graph()?, output.as_deref())?;
            if let Some(path) = report {
                write_json(&run_report, Some(&path))?;
            }
            Ok(())
        }
        Command::Cleanse {
            source,
            keep_run,
            output,
        } => {
            let store = open_source(&source)?;
            let report = store.cleanse(&keep_run)?;
            if source.corpus.is_some() {
                write_json(&store.snapshot()?, output.as_deref())?;
                tracing::info!(
                    mentions = report.mentions_removed,
                    relations = report.relations_removed,
                    "corpus cleansed"
                );
                Ok(())
            } else {
                write_json(&report, None)
            }
        }
        Command::Analyze { graph, config, top } => {
            let config = load_config(config.as_deref())?;
            let graph: KnowledgeGraph = read_json(&graph)?;
            let store = InMemoryGraphStore::from_graph(graph);
            let mut report = analyze(&store, &config.analysis)?;
            report.ranks.truncate(top);
            write_json(&report, None)
        }
    }
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "kyrokg failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
