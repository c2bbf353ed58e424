//! Extraction runner tests: payload handling, retries across runs and
//! stability cleansing.

use std::sync::atomic::{AtomicBool, Ordering};

use kyrokg::{
    ConsolidationPipeline, ExtractionError, Label, PageRecord, PageSelection, PageStatus,
    PipelineConfig,
};

fn pages(n: u32) -> Vec<PageRecord> {
    (1..=n)
        .map(|i| PageRecord {
            id: format!("rac_ww_1939_{i}"),
            page_idx: i,
            text: format!("page {i}"),
        })
        .collect()
}

const BUSH: &str = r#"{
    "entities": {
        "person": [{"id": "1", "name": "Dr. Vannevar Bush", "titles": ["President"]}],
        "technology": [{"id": "2", "name": "Differential Analyzer"}],
        "job title": [{"id": "3", "name": "Chairman"}]
    },
    "relations": {
        "works on": [{"source": "1", "target": "2", "sentiment": "positive"}],
        "talked to": [{"source": "1", "target": "9"}]
    }
}"#;

#[test]
fn test_payload_becomes_mentions() {
    let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
    pipeline.ingest(pages(1)).unwrap();
    let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(BUSH.to_string()) };

    let report = pipeline.extract(&extractor, "run-1").unwrap();
    assert_eq!(report.pages_processed, 1);
    // Three entities plus the Title mention created from `titles`.
    assert_eq!(report.mentions_added, 4);
    assert_eq!(report.dangling_relations, 1);

    let corpus = pipeline.mention_store().snapshot().unwrap();
    let labels: Vec<&Label> = corpus.mentions().iter().map(|m| &m.label).collect();
    assert!(labels.contains(&&Label::Other("JobTitle".to_string())));
    assert!(labels.contains(&&Label::Title));

    let rel_types: Vec<&str> = corpus.relations().iter().map(|r| r.rel_type.as_str()).collect();
    assert!(rel_types.contains(&"WORKS_ON"));
    assert!(rel_types.contains(&"HAS_TITLE"));

    pipeline.resolve_and_build().unwrap();
    let graph = pipeline.graph().unwrap();
    let bush = graph.node(&Label::Person, "Vannevar Bush").unwrap();
    assert_eq!(bush.titles, vec!["President".to_string()]);
    assert!(graph.node(&Label::Title, "President").is_some());
    let works_on: Vec<_> = graph.relations_of_type("WORKS_ON").collect();
    assert_eq!(works_on[0].sentiment.as_deref(), Some("positive"));
}

#[test]
fn test_failed_page_is_picked_up_by_later_run() {
    let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
    pipeline.ingest(pages(3)).unwrap();

    let broken = AtomicBool::new(true);
    let extractor = |page_id: &str, _: &str| -> Result<String, ExtractionError> {
        if page_id == "rac_ww_1939_2" && broken.load(Ordering::SeqCst) {
            Ok("I could not find any entities on this page.".to_string())
        } else {
            Ok(BUSH.to_string())
        }
    };

    let first = pipeline.extract(&extractor, "run-1").unwrap();
    assert_eq!(first.pages_processed, 2);
    assert_eq!(first.pages_retried, 1);
    assert_eq!(first.pages_failed, 1);

    let corpus = pipeline.mention_store().snapshot().unwrap();
    let failed = corpus.page("rac_ww_1939_2").unwrap();
    assert_eq!(failed.status, PageStatus::Failed);
    assert_eq!(failed.attempts, 2);
    assert!(corpus.mentions_on_page("rac_ww_1939_2").is_empty());

    broken.store(false, Ordering::SeqCst);
    let second = pipeline.extract(&extractor, "run-2").unwrap();
    assert_eq!(second.pages_submitted, 1);
    assert_eq!(second.pages_processed, 1);
    assert!(pipeline.mention_store().pending_pages().unwrap().is_empty());
}

const BUSH_ONLY: &str = r#"{
    "entities": {"person": [{"id": "1", "name": "Dr. Vannevar Bush"}]},
    "relations": {}
}"#;

#[test]
fn test_reextraction_then_cleanse_keeps_stable_mentions() {
    let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
    pipeline.ingest(pages(2)).unwrap();

    let second_run = AtomicBool::new(false);
    let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> {
        Ok(if second_run.load(Ordering::SeqCst) { BUSH_ONLY } else { BUSH }.to_string())
    };
    pipeline.extract(&extractor, "run-1").unwrap();
    assert_eq!(pipeline.mention_store().snapshot().unwrap().len(), 8);

    second_run.store(true, Ordering::SeqCst);
    let report = pipeline.extract_pages(&extractor, "run-2", PageSelection::All).unwrap();
    assert_eq!(report.pages_submitted, 2);
    assert_eq!(report.mentions_reproduced, 2);
    assert_eq!(report.mentions_added, 0);

    let cleansed = pipeline.cleanse("run-2").unwrap();
    assert_eq!(cleansed.mentions_removed, 6);
    let corpus = pipeline.mention_store().snapshot().unwrap();
    assert_eq!(corpus.len(), 2);
    assert!(corpus.relations().is_empty());
    assert!(corpus.mentions().iter().all(|m| m.name == "Dr. Vannevar Bush"));
}

#[test]
fn test_identical_reextraction_survives_cleanse() {
    let pipeline = ConsolidationPipeline::in_memory(PipelineConfig::default()).unwrap();
    pipeline.ingest(pages(1)).unwrap();
    let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(BUSH.to_string()) };
    pipeline.extract(&extractor, "run-1").unwrap();

    // Pending selection has nothing left to send.
    assert_eq!(pipeline.extract(&extractor, "run-2").unwrap().pages_submitted, 0);

    pipeline.extract_pages(&extractor, "run-2", PageSelection::All).unwrap();
    let cleansed = pipeline.cleanse("run-2").unwrap();
    assert_eq!(cleansed.mentions_removed, 0);
    assert_eq!(cleansed.relations_removed, 0);
    assert_eq!(pipeline.mention_store().snapshot().unwrap().len(), 4);
}
