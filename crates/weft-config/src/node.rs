use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::action::ActionDef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDef {
  pub node_id: String,
  #[serde(flatten)]
  pub action: ActionDef,
  #[serde(default)]
  pub inputs: Vec<PortDef>,
  /// Output ports. Command, data source and sink nodes derive theirs from
  /// the action when this is empty.
  #[serde(default)]
  pub outputs: Vec<String>,
  /// Input ports to fan out over. Non-empty makes the node mapped.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub map_over: Vec<String>,
  /// Fixed input values. String values may reference `{{ params.* }}`.
  #[serde(default)]
  pub fixed: BTreeMap<String, serde_json::Value>,
  /// Input port -> iterable axis name.
  #[serde(default)]
  pub axes: BTreeMap<String, String>,
  /// Set to `false` to always re-run the node.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub cache: Option<bool>,
}

/// An input port, either a bare name (required, scalar) or a full
/// declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortDef {
  Name(String),
  Full {
    name: String,
    #[serde(default = "default_true")]
    required: bool,
    #[serde(default)]
    list: bool,
    #[serde(default)]
    aggregate: bool,
  },
}

impl PortDef {
  pub fn name(&self) -> &str {
    match self {
      Self::Name(name) => name,
      Self::Full { name, .. } => name,
    }
  }
}

fn default_true() -> bool {
  true
}
