use async_trait::async_trait;

use crate::{Action, ActionContext, ActionError, Inputs, Outputs};

/// Forwards every input to the output port of the same name.
///
/// Used for parameter-source nodes whose ports are bound to iteration axes.
#[derive(Debug, Clone, Default)]
pub struct Identity;

#[async_trait]
impl Action for Identity {
  fn name(&self) -> &str {
    "identity"
  }

  async fn invoke(&self, inputs: Inputs, _ctx: &ActionContext) -> Result<Outputs, ActionError> {
    Ok(inputs)
  }
}
