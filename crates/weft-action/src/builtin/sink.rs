use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use weft_artifact::{Artifact, Sink, SinkWriteError};

use crate::{Action, ActionContext, ActionError, Inputs, Outputs, inputs_to_json};

/// Input port naming the per-context output folder.
pub const CONTAINER_PORT: &str = "container";

/// Deposits every connected input through a [`Sink`].
///
/// Each input port `p` (other than `container`) is deposited to
/// `{{ container }}/p` unless an explicit destination template was configured
/// for it. Deposits are independent: every port is attempted, and failures
/// are reported together once all deposits ran. The output port of the same
/// name lists the written paths.
pub struct SinkAction {
  sink: Arc<dyn Sink>,
  destinations: BTreeMap<String, String>,
}

impl SinkAction {
  pub fn new(sink: Arc<dyn Sink>) -> Self {
    Self {
      sink,
      destinations: BTreeMap::new(),
    }
  }

  pub fn with_destination(mut self, port: impl Into<String>, template: impl Into<String>) -> Self {
    self.destinations.insert(port.into(), template.into());
    self
  }

  fn destination_for(&self, port: &str, has_container: bool) -> String {
    match self.destinations.get(port) {
      Some(template) => template.clone(),
      None if has_container => format!("{{{{ {} }}}}/{}", CONTAINER_PORT, port),
      None => port.to_string(),
    }
  }
}

#[async_trait]
impl Action for SinkAction {
  fn name(&self) -> &str {
    "sink"
  }

  async fn invoke(&self, inputs: Inputs, ctx: &ActionContext) -> Result<Outputs, ActionError> {
    let mut template_ctx = match &ctx.context {
      serde_json::Value::Object(map) => map.clone(),
      _ => serde_json::Map::new(),
    };
    template_ctx.extend(inputs_to_json(&inputs));
    let template_ctx = serde_json::Value::Object(template_ctx);

    let has_container = inputs.contains_key(CONTAINER_PORT);
    let mut outputs = Outputs::new();
    let mut failures = Vec::new();

    for (port, artifact) in inputs.iter().filter(|(p, _)| *p != CONTAINER_PORT) {
      let destination = self.destination_for(port, has_container);
      match self.sink.deposit(artifact, &destination, &template_ctx).await {
        Ok(written) => {
          outputs.insert(
            port.clone(),
            Artifact::List(written.into_iter().map(Artifact::File).collect()),
          );
        }
        Err(e) => {
          warn!(node = %ctx.node, port = %port, error = %e, "deposit_failed");
          failures.push(e);
        }
      }
    }

    match failures.len() {
      0 => Ok(outputs),
      1 => Err(ActionError::Sink(failures.remove(0))),
      _ => Err(ActionError::Sink(SinkWriteError::Multiple(failures))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weft_artifact::FsSink;

  #[tokio::test]
  async fn test_sink_action_deposits_under_container() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let src = src_dir.path().join("warped.nii.gz");
    std::fs::write(&src, "anat").unwrap();

    let action = SinkAction::new(Arc::new(FsSink::new(out_dir.path())));
    let inputs = Inputs::from([
      (CONTAINER_PORT.to_string(), Artifact::value("sub01")),
      ("norm_anat".to_string(), Artifact::file(&src)),
    ]);

    let ctx = ActionContext::detached("datasink", src_dir.path());
    let outputs = action.invoke(inputs, &ctx).await.unwrap();

    let expected = out_dir.path().join("sub01/norm_anat/warped.nii.gz");
    assert!(expected.exists());
    assert_eq!(outputs["norm_anat"], Artifact::List(vec![Artifact::File(expected)]));
    assert!(!outputs.contains_key(CONTAINER_PORT));
  }

  #[tokio::test]
  async fn test_sink_action_attempts_every_port() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let good = src_dir.path().join("good.txt");
    std::fs::write(&good, "ok").unwrap();

    let action = SinkAction::new(Arc::new(FsSink::new(out_dir.path())));
    let inputs = Inputs::from([
      ("a_missing".to_string(), Artifact::file("/nonexistent/a.txt")),
      ("b_good".to_string(), Artifact::file(&good)),
    ]);

    let ctx = ActionContext::detached("datasink", src_dir.path());
    let err = action.invoke(inputs, &ctx).await.unwrap_err();

    assert!(matches!(err, ActionError::Sink(SinkWriteError::Io { .. })));
    assert!(out_dir.path().join("b_good/good.txt").exists());
  }
}
