use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_artifact::Artifact;

/// Status of a cached result. Failures are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EntryStatus {
  Done,
}

/// A completed invocation as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
  pub key: String,
  pub status: EntryStatus,
  pub outputs: BTreeMap<String, Artifact>,
  pub created_at: DateTime<Utc>,
}

impl CacheEntry {
  /// A `Done` entry stamped with the current time.
  pub fn done(key: impl Into<String>, outputs: BTreeMap<String, Artifact>) -> Self {
    Self {
      key: key.into(),
      status: EntryStatus::Done,
      outputs,
      created_at: Utc::now(),
    }
  }
}
