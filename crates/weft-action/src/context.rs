use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

/// Per-invocation context handed to an action.
#[derive(Debug, Clone)]
pub struct ActionContext {
  /// Name of the node being executed.
  pub node: String,
  /// Human-readable instance label, e.g. `smooth[subject_id=sub01][2]`.
  pub instance: String,
  /// Iteration context values (axis name to value).
  pub context: serde_json::Value,
  /// Scratch directory reserved for this invocation's output files.
  pub work_dir: PathBuf,
  /// Fires when the run asks in-flight actions to terminate.
  pub cancel: CancellationToken,
}

impl ActionContext {
  /// A context for invoking an action outside of a run.
  pub fn detached(node: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
    let node = node.into();
    Self {
      instance: node.clone(),
      node,
      context: serde_json::Value::Object(Default::default()),
      work_dir: work_dir.into(),
      cancel: CancellationToken::new(),
    }
  }
}
