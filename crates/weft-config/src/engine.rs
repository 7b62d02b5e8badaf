use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What happens to in-flight actions when a run is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelPolicy {
  /// Let running actions finish; only undispatched instances are cancelled.
  #[default]
  RunToCompletion,
  /// Ask running actions to terminate (best effort).
  Terminate,
}

/// Configuration for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Maximum number of concurrently running actions.
  pub concurrency: usize,
  /// SQLite cache database. `None` keeps the cache in memory for one run.
  pub cache_path: Option<PathBuf>,
  /// Root of per-instance working directories.
  pub work_dir: PathBuf,
  pub cancel_policy: CancelPolicy,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      concurrency: std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4),
      cache_path: None,
      work_dir: std::env::temp_dir().join("weft"),
      cancel_policy: CancelPolicy::RunToCompletion,
    }
  }
}
