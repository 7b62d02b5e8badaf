//! Action abstraction for weft.
//!
//! Every node in a pipeline is bound to an [`Action`]: an external tool or a
//! pure function with declared input and output names. The engine invokes an
//! action with a map of resolved inputs and expects a map of outputs back.
//!
//! Built-in actions:
//! - [`Identity`] forwards its inputs (parameter sources, fan-in points)
//! - [`FnAction`] wraps a plain Rust function
//! - [`CommandAction`] runs an external executable
//! - [`DataSourceAction`] locates input files through a [`DataSource`]
//! - [`SinkAction`] deposits final artifacts through a [`weft_artifact::Sink`]

mod builtin;
mod context;
mod error;

use std::collections::BTreeMap;

use async_trait::async_trait;
use weft_artifact::Artifact;

pub use builtin::{
  CONTAINER_PORT, CommandAction, DataSource, DataSourceAction, FnAction, Identity, SinkAction,
  TemplateDataSource,
};
pub use context::ActionContext;
pub use error::ActionError;

/// Resolved inputs, keyed by declared parameter name.
pub type Inputs = BTreeMap<String, Artifact>;

/// Produced outputs, keyed by declared output port name.
pub type Outputs = BTreeMap<String, Artifact>;

/// A unit of work bound to a node.
#[async_trait]
pub trait Action: Send + Sync {
  /// Stable name of the action. Participates in cache keys.
  fn name(&self) -> &str;

  /// Version of the action. Bumping it invalidates cached results.
  fn version(&self) -> &str {
    "1"
  }

  /// Invoke the action with resolved inputs.
  async fn invoke(&self, inputs: Inputs, ctx: &ActionContext) -> Result<Outputs, ActionError>;
}

/// Build a JSON object from inputs for template rendering.
pub fn inputs_to_json(inputs: &Inputs) -> serde_json::Map<String, serde_json::Value> {
  inputs
    .iter()
    .map(|(k, v)| (k.clone(), v.to_json()))
    .collect()
}
