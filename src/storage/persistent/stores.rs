//! Durable mention store.
//!
//! The whole corpus and the resolved names are kept in memory and written
//! as one snapshot file after each mutation. A snapshot is written to a
//! temporary file, fsynced and renamed over the previous one, so a crash
//! leaves either the old or the new snapshot on disk.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::corpus::{CleanseReport, Corpus, Page, PageRecord, PageSelection, RecordOutcome};
use crate::extraction::Extraction;
use crate::resolution::ResolvedNames;
use crate::storage::traits::{MentionStore, StorageError};

use super::codec;
use super::file_lock::FileLock;
use super::PersistentConfig;

const SNAPSHOT_FILE: &str = "mentions.kykg";

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MentionState {
    corpus: Corpus,
    #[serde(default)]
    names: ResolvedNames,
}

/// Mention store persisted to a directory.
///
/// Only one handle per directory can be open at a time.
#[derive(Debug)]
pub struct PersistentMentionStore {
    dir: PathBuf,
    config: PersistentConfig,
    state: RwLock<MentionState>,
    _lock: FileLock,
}

impl PersistentMentionStore {
    /// Opens the store in `dir`, creating the directory if needed and loading
    /// the last snapshot.
    ///
    /// # Errors
    /// - `Locked` if another handle holds the directory
    /// - `Corrupted` if the snapshot fails its integrity checks
    /// - `BackendError` on IO failure
    pub fn open(dir: &Path, config: PersistentConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(dir)
            .map_err(|e| StorageError::BackendError(format!("cannot create {}: {e}", dir.display())))?;
        let lock = FileLock::acquire(dir)?;

        let path = dir.join(SNAPSHOT_FILE);
        let state = if path.exists() {
            let file = File::open(&path)
                .map_err(|e| StorageError::BackendError(format!("cannot open {}: {e}", path.display())))?;
            let mut reader = BufReader::new(file);
            codec::read_header(&mut reader)?;
            codec::decode(&mut reader, config.max_snapshot_bytes)?
        } else {
            MentionState::default()
        };

        tracing::debug!(
            dir = %dir.display(),
            pages = state.corpus.pages().len(),
            mentions = state.corpus.len(),
            "mention store opened"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            state: RwLock::new(state),
            _lock: lock,
        })
    }

    /// Directory holding the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the current state to disk.
    ///
    /// # Errors
    /// Returns storage errors from encoding or IO.
    pub fn flush(&self) -> Result<(), StorageError> {
        let state = self.state.read().map_err(|_| lock_err("persistent.flush"))?;
        self.write_snapshot(&state)
    }

    fn write_snapshot(&self, state: &MentionState) -> Result<(), StorageError> {
        let bytes = codec::encode(state, self.config.max_snapshot_bytes)?;
        let final_path = self.dir.join(SNAPSHOT_FILE);
        let temp_path = self.dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        let io = |e: std::io::Error| StorageError::BackendError(format!("snapshot write failed: {e}"));

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(io)?;
        let mut writer = BufWriter::new(file);
        codec::write_header(&mut writer)?;
        writer.write_all(&bytes).map_err(io)?;
        writer.flush().map_err(io)?;
        if self.config.sync_on_write {
            writer.get_ref().sync_all().map_err(io)?;
        }
        drop(writer);
        fs::rename(&temp_path, &final_path).map_err(io)?;
        Ok(())
    }

    fn mutate<T>(
        &self,
        context: &'static str,
        f: impl FnOnce(&mut MentionState) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err(context))?;
        let out = f(&mut state)?;
        self.write_snapshot(&state)?;
        Ok(out)
    }
}

impl MentionStore for PersistentMentionStore {
    fn add_pages(&self, pages: Vec<PageRecord>) -> Result<usize, StorageError> {
        self.mutate("persistent.add_pages", |state| {
            let mut added = 0;
            for record in pages {
                let is_new = state.corpus.page(&record.id).is_none();
                state.corpus.add_page(record)?;
                if is_new {
                    added += 1;
                }
            }
            Ok(added)
        })
    }

    fn select_pages(&self, selection: PageSelection) -> Result<Vec<Page>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("persistent.select_pages"))?;
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
        self.mutate("persistent.record_extraction", |state| {
            Ok(state.corpus.record_extraction(page_id, extraction, run)?)
        })
    }

    fn mark_failed(&self, page_id: &str, reason: &str) -> Result<(), StorageError> {
        self.mutate("persistent.mark_failed", |state| {
            Ok(state.corpus.mark_failed(page_id, reason)?)
        })
    }

    fn snapshot(&self) -> Result<Corpus, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("persistent.snapshot"))?;
        Ok(state.corpus.clone())
    }

    fn cleanse(&self, keep_run: &str) -> Result<CleanseReport, StorageError> {
        self.mutate("persistent.cleanse", |state| Ok(state.corpus.cleanse(keep_run)))
    }

    fn store_names(&self, names: ResolvedNames) -> Result<(), StorageError> {
        self.mutate("persistent.store_names", |state| {
            state.names = names;
            Ok(())
        })
    }

    fn resolved_names(&self) -> Result<ResolvedNames, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("persistent.resolved_names"))?;
        Ok(state.names.clone())
    }
}
