//! Durability tests for the persistent mention store.

#![cfg(feature = "persistent")]

use std::fs;
use std::sync::Arc;

use kyrokg::storage::persistent::{open_mention_store, MAGIC};
use kyrokg::{
    ConsolidationPipeline, ExtractionError, InMemoryGraphStore, Label, MentionStore, PageRecord,
    PipelineConfig, StorageError,
};
use tempfile::tempdir;

const PAYLOAD: &str = r#"{
    "entities": {
        "Person": [{"id": "1", "name": "Frank B. Jewett"}, {"id": "2", "name": "Jewett"}],
        "Organization": [{"id": "3", "name": "Bell Telephone Laboratories"}]
    },
    "relations": {"WORKS_FOR": [{"source": "2", "target": "3"}]}
}"#;

fn pipeline_at(path: &std::path::Path) -> ConsolidationPipeline {
    let mentions: Arc<dyn MentionStore> = Arc::new(open_mention_store(path, None).unwrap());
    ConsolidationPipeline::new(mentions, Arc::new(InMemoryGraphStore::new()), PipelineConfig::default()).unwrap()
}

#[test]
fn test_graph_rebuilds_after_reopen() {
    let dir = tempdir().unwrap();
    let store_dir = dir.path().join("diaries");

    let graph = {
        let pipeline = pipeline_at(&store_dir);
        pipeline
            .ingest(vec![PageRecord {
                id: "ww_1940_3".to_string(),
                page_idx: 3,
                text: "Lunch with Jewett.".to_string(),
            }])
            .unwrap();
        let extractor = |_: &str, _: &str| -> Result<String, ExtractionError> { Ok(PAYLOAD.to_string()) };
        pipeline.run(Some(&extractor)).unwrap();
        pipeline.graph().unwrap()
    };
    assert_eq!(graph.node(&Label::Person, "Frank B. Jewett").unwrap().count, 1);

    let pipeline = pipeline_at(&store_dir);
    assert!(pipeline.mention_store().pending_pages().unwrap().is_empty());
    assert_eq!(pipeline.mention_store().resolved_names().unwrap().len(), 3);

    pipeline.rebuild_graph().unwrap();
    assert_eq!(pipeline.graph().unwrap(), graph);
}

#[test]
fn test_snapshot_file_layout() {
    let dir = tempdir().unwrap();
    {
        let store = open_mention_store(dir.path(), None).unwrap();
        store
            .add_pages(vec![PageRecord {
                id: "ww_1940_4".to_string(),
                page_idx: 4,
                text: String::new(),
            }])
            .unwrap();
    }
    let bytes = fs::read(dir.path().join("mentions.kykg")).unwrap();
    assert_eq!(&bytes[..4], &MAGIC);
    assert!(dir.path().join(".lock").exists());
}

#[test]
fn test_truncated_snapshot_is_corrupted() {
    let dir = tempdir().unwrap();
    {
        let store = open_mention_store(dir.path(), None).unwrap();
        store
            .add_pages(vec![PageRecord {
                id: "ww_1940_5".to_string(),
                page_idx: 5,
                text: "text".to_string(),
            }])
            .unwrap();
    }
    let path = dir.path().join("mentions.kykg");
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    let size = file.metadata().unwrap().len();
    file.set_len(size * 4 / 5).unwrap();
    drop(file);

    let err = open_mention_store(dir.path(), None).unwrap_err();
    assert!(err.is_storage());
    assert!(matches!(err, kyrokg::KgError::Storage(StorageError::Corrupted(_))));
}
