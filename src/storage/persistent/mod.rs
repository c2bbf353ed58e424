//! Persistent storage backend for kyrokg.
//!
//! The durable mention store keeps its state in one directory:
//! - `mentions.kykg`, a checksummed snapshot of pages, mentions, relations
//!   and resolved names, replaced atomically on every write
//! - `.lock`, an exclusive lock held while the store is open
//!
//! The canonical graph is always rebuilt from the mention store, so it has
//! no durable backend of its own.

mod codec;
mod file_lock;
mod stores;

pub use codec::MAGIC;
pub use file_lock::FileLock;
pub use stores::PersistentMentionStore;

use std::path::Path;

use crate::error::{KgResult, ValidationError};

/// Configuration for persistent storage.
#[derive(Debug, Clone)]
pub struct PersistentConfig {
    /// Whether to fsync each snapshot before it replaces the previous one.
    pub sync_on_write: bool,
    /// Largest snapshot payload accepted when writing or loading (bytes).
    pub max_snapshot_bytes: u32,
}

impl Default for PersistentConfig {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            max_snapshot_bytes: 512 * 1024 * 1024,
        }
    }
}

impl PersistentConfig {
    const MIN_SNAPSHOT_BYTES: u32 = 4 * 1024;

    /// Rejects limits too small to hold an empty corpus.
    ///
    /// # Errors
    /// Returns `InvalidConfig` if `max_snapshot_bytes` is below 4 KiB.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.max_snapshot_bytes < Self::MIN_SNAPSHOT_BYTES {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "max_snapshot_bytes must be at least {} bytes (got {})",
                    Self::MIN_SNAPSHOT_BYTES,
                    self.max_snapshot_bytes
                ),
            });
        }
        Ok(self)
    }
}

/// Opens or creates a persistent mention store at `path`.
///
/// # Errors
/// - If the configuration is invalid
/// - If another process holds the lock
/// - If the snapshot cannot be read or is corrupted
///
/// # Example
/// ```rust,ignore
/// use kyrokg::storage::persistent::open_mention_store;
///
/// let mentions = Arc::new(open_mention_store("./diaries.kykg", None)?);
/// let pipeline = ConsolidationPipeline::new(mentions, Arc::new(InMemoryGraphStore::new()), config)?;
/// ```
pub fn open_mention_store(
    path: impl AsRef<Path>,
    config: Option<PersistentConfig>,
) -> KgResult<PersistentMentionStore> {
    let cfg = config.unwrap_or_default().validate()?;
    Ok(PersistentMentionStore::open(path.as_ref(), cfg)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        assert!(PersistentConfig::default().validate().is_ok());
        let tiny = PersistentConfig {
            max_snapshot_bytes: 10,
            ..PersistentConfig::default()
        };
        assert!(tiny.validate().is_err());
    }

    #[test]
    fn test_open_mention_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store");
        let store = open_mention_store(&path, None).unwrap();
        assert_eq!(store.dir(), path.as_path());
    }
}
