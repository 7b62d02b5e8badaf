use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// An output value produced by a node instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Artifact {
  /// A structured value.
  Value(serde_json::Value),
  /// A reference to a persisted file.
  File(PathBuf),
  /// An ordered list, e.g. the collected outputs of a mapped node.
  List(Vec<Artifact>),
}

impl Artifact {
  pub fn value(value: impl Into<serde_json::Value>) -> Self {
    Self::Value(value.into())
  }

  pub fn file(path: impl Into<PathBuf>) -> Self {
    Self::File(path.into())
  }

  pub fn empty_list() -> Self {
    Self::List(Vec::new())
  }

  /// Convert plain JSON into an artifact. Arrays become lists.
  pub fn from_json(value: serde_json::Value) -> Self {
    match value {
      serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
      other => Self::Value(other),
    }
  }

  pub fn as_list(&self) -> Option<&[Artifact]> {
    match self {
      Self::List(items) => Some(items),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Value(serde_json::Value::String(s)) => Some(s),
      _ => None,
    }
  }

  /// Split into elements. A non-list artifact is a list of one.
  pub fn into_elements(self) -> Vec<Artifact> {
    match self {
      Self::List(items) => items,
      other => vec![other],
    }
  }

  /// Plain JSON view used for templates: files render as their path.
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      Self::Value(value) => value.clone(),
      Self::File(path) => serde_json::Value::String(path.display().to_string()),
      Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
    }
  }
}

impl From<serde_json::Value> for Artifact {
  fn from(value: serde_json::Value) -> Self {
    Self::from_json(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_from_json_arrays_become_lists() {
    let artifact = Artifact::from_json(json!(["a", ["b"]]));
    assert_eq!(
      artifact,
      Artifact::List(vec![
        Artifact::value("a"),
        Artifact::List(vec![Artifact::value("b")]),
      ])
    );
  }

  #[test]
  fn test_into_elements_wraps_scalar() {
    assert_eq!(Artifact::value(1).into_elements(), vec![Artifact::value(1)]);
    assert!(Artifact::empty_list().into_elements().is_empty());
  }

  #[test]
  fn test_to_json_renders_files_as_paths() {
    let artifact = Artifact::List(vec![Artifact::file("/data/a.nii"), Artifact::value(3)]);
    assert_eq!(artifact.to_json(), json!(["/data/a.nii", 3]));
  }

  #[test]
  fn test_serde_tagging() {
    let encoded = serde_json::to_value(Artifact::file("/x")).unwrap();
    assert_eq!(encoded, json!({"kind": "file", "value": "/x"}));
  }
}
