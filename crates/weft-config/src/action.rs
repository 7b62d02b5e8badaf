use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The action a node is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionDef {
  /// Forward inputs to the outputs of the same name.
  Identity,

  /// Run an external program. Arguments, environment values and produced
  /// file paths are templates over the inputs and `work_dir`.
  Command {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    /// Output port -> path template of the produced file.
    #[serde(default)]
    produces: BTreeMap<String, String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
  },

  /// Locate files by glob templates over the node's inputs.
  DataSource {
    base_directory: String,
    /// Output port -> path template, relative to `base_directory`.
    field_templates: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    sorted: bool,
  },

  /// A function action registered with the resolver under `function`.
  Function { function: String },

  /// Deposit every input under `base_directory`.
  Sink {
    base_directory: String,
    /// Input port -> destination template. Defaults to `{{ container }}/port`.
    #[serde(default)]
    destinations: BTreeMap<String, String>,
  },
}

fn default_true() -> bool {
  true
}
