use serde::{Deserialize, Serialize};

/// A selection policy tag, e.g. `"first"`, `"middle"`, `"last"`, `"index:3"`.
///
/// Tags are parsed case-insensitively when the pipeline is resolved; an
/// unknown tag is a resolve error.
pub type SelectorDef = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
  pub from: String,
  pub from_port: String,
  pub to: String,
  pub to_port: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub selector: Option<SelectorDef>,
}
