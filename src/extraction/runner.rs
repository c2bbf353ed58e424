//! Extraction runner.
//!
//! Sends the selected pages (by default the pending ones) through an
//! [`Extractor`] on a bounded pool of named worker threads, parses the output and records usable payloads in the
//! mention store. Pages whose output cannot be used are given one more
//! attempt in a second pass of the same run; pages that fail again stay
//! `Failed` and are picked up by a later run.

use std::thread;

use crossbeam_channel::{bounded, unbounded};
use serde::{Deserialize, Serialize};

use super::payload::{parse_extraction, Extraction};
use crate::config::ExtractionConfig;
use crate::corpus::{Page, PageSelection};
use crate::error::{ExtractionError, KgError, KgResult};
use crate::storage::MentionStore;

/// The external collaborator that turns page text into a raw payload.
///
/// Implementations are called concurrently from several worker threads.
pub trait Extractor: Send + Sync {
    /// Returns the raw extraction output for one page of text.
    ///
    /// # Errors
    /// Returns `CallFailed` when the call itself did not produce an answer.
    fn extract(&self, page_id: &str, text: &str) -> Result<String, ExtractionError>;
}

impl<F> Extractor for F
where
    F: Fn(&str, &str) -> Result<String, ExtractionError> + Send + Sync,
{
    fn extract(&self, page_id: &str, text: &str) -> Result<String, ExtractionError> {
        self(page_id, text)
    }
}

/// Counters of one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Pages selected for this run.
    pub pages_submitted: usize,
    /// Pages whose payload was recorded.
    pub pages_processed: usize,
    /// Pages sent through the second pass.
    pub pages_retried: usize,
    /// Pages left `Failed` at the end of the run.
    pub pages_failed: usize,
    /// Mentions new to the corpus.
    pub mentions_added: usize,
    /// Mentions reproduced from an earlier run.
    pub mentions_reproduced: usize,
    /// Relations new to the corpus.
    pub relations_added: usize,
    /// Relations reproduced from an earlier run.
    pub relations_reproduced: usize,
    /// Relations dropped for an unknown endpoint.
    pub dangling_relations: usize,
    /// Entities skipped for a blank name.
    pub blank_entities: usize,
}

struct Job {
    seq: usize,
    page: Page,
}

type JobResult = (usize, Page, Result<Extraction, ExtractionError>);

/// Drives an [`Extractor`] over the pending pages of a mention store.
pub struct ExtractionRunner<'a> {
    extractor: &'a dyn Extractor,
    config: ExtractionConfig,
}

impl<'a> ExtractionRunner<'a> {
    /// Creates a runner. The configuration is validated here.
    ///
    /// # Errors
    /// Returns a validation error for a degenerate pool size.
    pub fn new(extractor: &'a dyn Extractor, config: ExtractionConfig) -> KgResult<Self> {
        Ok(Self {
            extractor,
            config: config.validate()?,
        })
    }

    /// Extracts every pending page of `store`, recording results under `run`.
    ///
    /// # Errors
    /// Returns storage errors and worker spawn failures.
    pub fn run(&self, store: &dyn MentionStore, run: &str) -> KgResult<ExtractionReport> {
        self.run_selected(store, run, PageSelection::Pending)
    }

    /// Extracts the pages picked by `selection`, recording results under
    /// `run`. With [`PageSelection::All`] processed pages are extracted again,
    /// so reproduced mentions gain `run`.
    ///
    /// Extraction failures never abort the run; store failures do.
    ///
    /// # Errors
    /// Returns storage errors and worker spawn failures.
    pub fn run_selected(
        &self,
        store: &dyn MentionStore,
        run: &str,
        selection: PageSelection,
    ) -> KgResult<ExtractionReport> {
        let _span = tracing::info_span!("extraction", run = run, selection = ?selection).entered();
        let mut report = ExtractionReport::default();

        let selected = store.select_pages(selection)?;
        report.pages_submitted = selected.len();
        if selected.is_empty() {
            tracing::info!("no pages selected for extraction");
            return Ok(report);
        }

        let mut retry = Vec::new();
        for (page, outcome) in self.pass(selected)? {
            match outcome {
                Ok(extraction) => Self::record(store, &page, &extraction, run, &mut report)?,
                Err(err) if self.config.retry_failed && err.is_retryable() => {
                    tracing::debug!(page = %page.id, error = %err, "queueing page for retry");
                    store.mark_failed(&page.id, &err.to_string())?;
                    retry.push(page);
                }
                Err(err) => {
                    tracing::warn!(page = %page.id, error = %err, "extraction failed");
                    store.mark_failed(&page.id, &err.to_string())?;
                    report.pages_failed += 1;
                }
            }
        }

        if !retry.is_empty() {
            report.pages_retried = retry.len();
            for (page, outcome) in self.pass(retry)? {
                match outcome {
                    Ok(extraction) => Self::record(store, &page, &extraction, run, &mut report)?,
                    Err(err) => {
                        tracing::warn!(page = %page.id, error = %err, "extraction failed after retry");
                        store.mark_failed(&page.id, &err.to_string())?;
                        report.pages_failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            submitted = report.pages_submitted,
            processed = report.pages_processed,
            retried = report.pages_retried,
            failed = report.pages_failed,
            mentions = report.mentions_added,
            relations = report.relations_added,
            "extraction finished"
        );
        Ok(report)
    }

    fn record(
        store: &dyn MentionStore,
        page: &Page,
        extraction: &Extraction,
        run: &str,
        report: &mut ExtractionReport,
    ) -> KgResult<()> {
        let outcome = store.record_extraction(&page.id, extraction, run)?;
        report.pages_processed += 1;
        report.mentions_added += outcome.mentions_added;
        report.mentions_reproduced += outcome.mentions_reproduced;
        report.relations_added += outcome.relations_added;
        report.relations_reproduced += outcome.relations_reproduced;
        report.dangling_relations += outcome.dangling_relations;
        report.blank_entities += outcome.blank_entities;
        if outcome.dangling_relations > 0 {
            tracing::warn!(
                page = %page.id,
                dangling = outcome.dangling_relations,
                "dropped relations with unknown endpoints"
            );
        }
        Ok(())
    }

    /// Runs one pass over `pages` on the worker pool.
    ///
    /// Results come back in submission order so the store sees the same
    /// write order regardless of thread scheduling.
    fn pass(&self, pages: Vec<Page>) -> KgResult<Vec<(Page, Result<Extraction, ExtractionError>)>> {
        let workers = self.config.workers.min(pages.len()).max(1);
        let extractor = self.extractor;

        let mut results: Vec<JobResult> = thread::scope(|scope| -> KgResult<Vec<JobResult>> {
            let (job_tx, job_rx) = bounded::<Job>(self.config.queue_capacity);
            let (result_tx, result_rx) = unbounded::<JobResult>();

            for idx in 0..workers {
                let rx = job_rx.clone();
                let tx = result_tx.clone();
                thread::Builder::new()
                    .name(format!("kyrokg-extract-{idx}"))
                    .spawn_scoped(scope, move || {
                        while let Ok(Job { seq, page }) = rx.recv() {
                            let text = page.text.as_deref().unwrap_or_default();
                            let outcome = extractor
                                .extract(&page.id, text)
                                .and_then(|raw| parse_extraction(&raw));
                            if tx.send((seq, page, outcome)).is_err() {
                                break;
                            }
                        }
                    })
                    .map_err(|e| KgError::internal(format!("failed to spawn extraction worker: {e}")))?;
            }
            drop(job_rx);
            drop(result_tx);

            for (seq, page) in pages.into_iter().enumerate() {
                job_tx
                    .send(Job { seq, page })
                    .map_err(|_| KgError::internal("extraction workers exited early"))?;
            }
            // Closing the queue lets workers drain it and exit.
            drop(job_tx);

            Ok(result_rx.iter().collect())
        })?;

        results.sort_by_key(|(seq, _, _)| *seq);
        Ok(results.into_iter().map(|(_, page, outcome)| (page, outcome)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{PageRecord, PageStatus};
    use crate::storage::InMemoryMentionStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PAYLOAD: &str = r#"{
        "entities": {"Person": [{"id": "1", "name": "Kirk"}]},
        "relations": {}
    }"#;

    fn store_with_pages(n: u32) -> InMemoryMentionStore {
        let store = InMemoryMentionStore::new();
        let pages = (1..=n)
            .map(|i| PageRecord {
                id: format!("log_{i}"),
                page_idx: i,
                text: format!("page {i}"),
            })
            .collect();
        store.add_pages(pages).unwrap();
        store
    }

    #[test]
    fn test_all_pages_processed() {
        let store = store_with_pages(10);
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(PAYLOAD.to_string()) };
        let config = ExtractionConfig {
            workers: 3,
            queue_capacity: 2,
            ..ExtractionConfig::default()
        };
        let runner = ExtractionRunner::new(&extractor, config).unwrap();

        let report = runner.run(&store, "run-1").unwrap();
        assert_eq!(report.pages_submitted, 10);
        assert_eq!(report.pages_processed, 10);
        assert_eq!(report.mentions_added, 10);
        assert!(store.pending_pages().unwrap().is_empty());

        let corpus = store.snapshot().unwrap();
        let pages: Vec<&str> = corpus.mentions().iter().map(|m| m.provenance.page_id.as_str()).collect();
        let expected: Vec<String> = (1..=10).map(|i| format!("log_{i}")).collect();
        assert_eq!(pages, expected);
    }

    #[test]
    fn test_format_error_retried_once() {
        let store = store_with_pages(2);
        let calls = AtomicUsize::new(0);
        let extractor = |page_id: &str, _: &str| -> Result<String, ExtractionError> {
            if page_id == "log_1" && calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("not json".to_string())
            } else {
                Ok(PAYLOAD.to_string())
            }
        };
        let runner = ExtractionRunner::new(&extractor, ExtractionConfig::default()).unwrap();

        let report = runner.run(&store, "run-1").unwrap();
        assert_eq!(report.pages_retried, 1);
        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.pages_failed, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_persistent_failure_stays_failed() {
        let store = store_with_pages(3);
        let extractor = |page_id: &str, _: &str| -> Result<String, ExtractionError> {
            if page_id == "log_2" {
                Ok(r#"{"entities": {}}"#.to_string())
            } else {
                Ok(PAYLOAD.to_string())
            }
        };
        let runner = ExtractionRunner::new(&extractor, ExtractionConfig::default()).unwrap();

        let report = runner.run(&store, "run-1").unwrap();
        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.pages_failed, 1);

        let pending = store.pending_pages().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "log_2");
        assert_eq!(pending[0].status, PageStatus::Failed);
        assert_eq!(pending[0].attempts, 2);
        assert!(pending[0].last_error.as_deref().unwrap().contains("relations"));
    }

    #[test]
    fn test_non_retryable_call_failure_skips_retry() {
        let store = store_with_pages(1);
        let calls = AtomicUsize::new(0);
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ExtractionError::CallFailed {
                message: "bad credentials".to_string(),
                retryable: false,
            })
        };
        let runner = ExtractionRunner::new(&extractor, ExtractionConfig::default()).unwrap();

        let report = runner.run(&store, "run-1").unwrap();
        assert_eq!(report.pages_retried, 0);
        assert_eq!(report.pages_failed, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_run_skips_processed_pages() {
        let store = store_with_pages(1);
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(PAYLOAD.to_string()) };
        let runner = ExtractionRunner::new(&extractor, ExtractionConfig::default()).unwrap();
        runner.run(&store, "run-1").unwrap();

        let report = runner.run(&store, "run-2").unwrap();
        assert_eq!(report.pages_submitted, 0);
    }

    #[test]
    fn test_select_all_reextracts_processed_pages() {
        let store = store_with_pages(2);
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(PAYLOAD.to_string()) };
        let runner = ExtractionRunner::new(&extractor, ExtractionConfig::default()).unwrap();
        runner.run(&store, "run-1").unwrap();

        let report = runner.run_selected(&store, "run-2", PageSelection::All).unwrap();
        assert_eq!(report.pages_submitted, 2);
        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.mentions_added, 0);
        assert_eq!(report.mentions_reproduced, 2);

        let corpus = store.snapshot().unwrap();
        assert!(corpus.mentions().iter().all(|m| m.runs.contains(&"run-2".to_string())));
    }

    #[test]
    fn test_rejects_zero_workers() {
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(PAYLOAD.to_string()) };
        let config = ExtractionConfig {
            workers: 0,
            ..ExtractionConfig::default()
        };
        assert!(ExtractionRunner::new(&extractor, config).is_err());
    }
}
