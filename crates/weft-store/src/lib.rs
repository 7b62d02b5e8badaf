//! Weft Store
//!
//! This crate provides the cache store behind the executor. Entries map a
//! cache key (a fingerprint of a node's action and resolved inputs) to the
//! artifacts a successful invocation produced.
//!
//! - [`MemoryStore`] lives for a single process
//! - [`SqliteStore`] persists entries so later runs can reuse them
//!
//! Only successful results are stored. Lookups and writes are idempotent.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{CacheEntry, EntryStatus};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// A stored entry could not be decoded.
  #[error("corrupt cache entry '{key}': {source}")]
  Corrupt {
    key: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Storage for completed results, keyed by cache key.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Look up a completed entry.
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error>;

  /// Record a completed entry, replacing any previous one for the same key.
  async fn put(&self, entry: &CacheEntry) -> Result<(), Error>;

  /// Evict an entry. Returns whether one existed.
  async fn remove(&self, key: &str) -> Result<bool, Error>;
}
