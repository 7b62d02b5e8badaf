use std::sync::Arc;

use async_trait::async_trait;

use crate::{Action, ActionContext, ActionError, Inputs, Outputs};

type ActionFn = dyn Fn(Inputs) -> Result<Outputs, ActionError> + Send + Sync;

/// An action backed by a plain Rust function.
#[derive(Clone)]
pub struct FnAction {
  name: String,
  version: String,
  func: Arc<ActionFn>,
}

impl FnAction {
  pub fn new<F>(name: impl Into<String>, func: F) -> Self
  where
    F: Fn(Inputs) -> Result<Outputs, ActionError> + Send + Sync + 'static,
  {
    Self {
      name: name.into(),
      version: "1".to_string(),
      func: Arc::new(func),
    }
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }
}

impl std::fmt::Debug for FnAction {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FnAction")
      .field("name", &self.name)
      .field("version", &self.version)
      .finish_non_exhaustive()
  }
}

#[async_trait]
impl Action for FnAction {
  fn name(&self) -> &str {
    &self.name
  }

  fn version(&self) -> &str {
    &self.version
  }

  async fn invoke(&self, inputs: Inputs, _ctx: &ActionContext) -> Result<Outputs, ActionError> {
    (self.func)(inputs)
  }
}
