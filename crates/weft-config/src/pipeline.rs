use serde::{Deserialize, Serialize};

use crate::edge::EdgeDef;
use crate::node::NodeDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDef {
  pub pipeline_id: String,
  pub name: String,
  /// Global configuration, visible to fixed-value templates as `params`.
  #[serde(default)]
  pub params: serde_json::Map<String, serde_json::Value>,
  /// Axes of the parameter set driving graph replication.
  #[serde(default)]
  pub iterables: Vec<AxisDef>,
  pub nodes: Vec<NodeDef>,
  #[serde(default)]
  pub edges: Vec<EdgeDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDef {
  pub name: String,
  pub values: Vec<serde_json::Value>,
}
