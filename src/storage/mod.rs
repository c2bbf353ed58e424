//! Storage traits and backends for kyrokg.
//!
//! The in-memory backends are always available; the durable mention store
//! lives behind the `persistent` feature.

mod memory;
mod traits;

#[cfg(feature = "persistent")]
pub mod persistent;

pub use memory::{InMemoryGraphStore, InMemoryMentionStore};
pub use traits::{GraphStore, MentionStore, StorageError};
