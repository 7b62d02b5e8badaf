//! Run results.

use std::fmt;

use serde::{Deserialize, Serialize};
use weft_action::Outputs;

/// Final status of an instance or mapped element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceStatus {
  /// The action ran and succeeded.
  Done,
  /// A stored result was reused.
  Cached,
  Failed { reason: String },
  /// Not dispatched (or terminated) because the run was cancelled.
  Cancelled,
  /// Not dispatched because `upstream` failed.
  Skipped { upstream: String },
}

impl InstanceStatus {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Done | Self::Cached)
  }
}

impl fmt::Display for InstanceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Done => write!(f, "DONE"),
      Self::Cached => write!(f, "CACHED"),
      Self::Failed { reason } => write!(f, "FAILED({})", reason),
      Self::Cancelled => write!(f, "CANCELLED"),
      Self::Skipped { upstream } => write!(f, "SKIPPED(UpstreamFailure: {})", upstream),
    }
  }
}

/// Outcome of one instance, or of one element of a mapped instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceReport {
  /// e.g. `smooth[subject_id=sub01][2]`
  pub instance: String,
  pub node: String,
  /// Iteration context values.
  pub context: serde_json::Value,
  /// Element index for mapped invocations.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub element: Option<usize>,
  #[serde(flatten)]
  pub status: InstanceStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cache_key: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub outputs: Option<Outputs>,
}

/// Result of a complete run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
  /// Unique run ID.
  pub run_id: String,
  /// Every instance in plan order; mapped elements in index order.
  pub instances: Vec<InstanceReport>,
}

impl RunResult {
  pub fn has_failures(&self) -> bool {
    self
      .instances
      .iter()
      .any(|r| matches!(r.status, InstanceStatus::Failed { .. }))
  }

  /// Reports for one node, in plan order.
  pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a InstanceReport> + 'a {
    self.instances.iter().filter(move |r| r.node == node)
  }

  pub fn get(&self, instance: &str) -> Option<&InstanceReport> {
    self.instances.iter().find(|r| r.instance == instance)
  }

  pub fn summary(&self) -> RunSummary {
    let mut summary = RunSummary::default();
    for report in &self.instances {
      match report.status {
        InstanceStatus::Done => summary.done += 1,
        InstanceStatus::Cached => summary.cached += 1,
        InstanceStatus::Failed { .. } => summary.failed += 1,
        InstanceStatus::Cancelled => summary.cancelled += 1,
        InstanceStatus::Skipped { .. } => summary.skipped += 1,
      }
    }
    summary
  }
}

/// Count of reports per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
  pub done: usize,
  pub cached: usize,
  pub failed: usize,
  pub cancelled: usize,
  pub skipped: usize,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn report(instance: &str, status: InstanceStatus) -> InstanceReport {
    InstanceReport {
      instance: instance.to_string(),
      node: instance.split('[').next().unwrap_or(instance).to_string(),
      context: json!({}),
      element: None,
      status,
      cache_key: None,
      outputs: None,
    }
  }

  #[test]
  fn test_summary_and_failures() {
    let result = RunResult {
      run_id: "r".to_string(),
      instances: vec![
        report("a", InstanceStatus::Done),
        report("b", InstanceStatus::Cached),
        report("c", InstanceStatus::Failed { reason: "boom".to_string() }),
        report("d", InstanceStatus::Skipped { upstream: "c".to_string() }),
      ],
    };

    let summary = result.summary();
    assert_eq!((summary.done, summary.cached, summary.failed, summary.skipped), (1, 1, 1, 1));
    assert!(result.has_failures());
    assert_eq!(result.get("d").unwrap().status.to_string(), "SKIPPED(UpstreamFailure: c)");
  }

  #[test]
  fn test_report_serializes_flat_status() {
    let value = serde_json::to_value(report(
      "strip[subject_id=sub01]",
      InstanceStatus::Failed { reason: "exit 1".to_string() },
    ))
    .unwrap();

    assert_eq!(value["status"], json!("FAILED"));
    assert_eq!(value["reason"], json!("exit 1"));
    assert_eq!(value["node"], json!("strip"));
    assert!(value.get("element").is_none());
  }
}
