use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use weft_artifact::{Artifact, render};

use crate::{Action, ActionContext, ActionError, Inputs, Outputs, inputs_to_json};

/// Bytes of stderr kept in a failure message.
const STDERR_TAIL: usize = 2048;

/// Runs an external executable.
///
/// Arguments and output paths are minijinja templates rendered against the
/// resolved inputs plus `work_dir`, the per-invocation scratch directory:
///
/// ```json
/// {
///   "program": "bet",
///   "args": ["{{ in_file }}", "{{ work_dir }}/brain.nii.gz"],
///   "outputs": { "out_file": "{{ work_dir }}/brain.nii.gz" }
/// }
/// ```
///
/// The command runs with `work_dir` as its current directory. After a zero
/// exit status every declared output must exist on disk.
#[derive(Debug, Clone)]
pub struct CommandAction {
  program: String,
  args: Vec<String>,
  outputs: BTreeMap<String, String>,
  env: BTreeMap<String, String>,
  version: String,
}

impl CommandAction {
  pub fn new(program: impl Into<String>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      outputs: BTreeMap::new(),
      env: BTreeMap::new(),
      version: "1".to_string(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  pub fn output(mut self, port: impl Into<String>, path_template: impl Into<String>) -> Self {
    self.outputs.insert(port.into(), path_template.into());
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn with_version(mut self, version: impl Into<String>) -> Self {
    self.version = version.into();
    self
  }

  fn template_context(&self, inputs: &Inputs, ctx: &ActionContext) -> serde_json::Value {
    let mut map = inputs_to_json(inputs);
    map.insert(
      "work_dir".to_string(),
      serde_json::Value::String(ctx.work_dir.display().to_string()),
    );
    serde_json::Value::Object(map)
  }
}

#[async_trait]
impl Action for CommandAction {
  fn name(&self) -> &str {
    &self.program
  }

  fn version(&self) -> &str {
    &self.version
  }

  async fn invoke(&self, inputs: Inputs, ctx: &ActionContext) -> Result<Outputs, ActionError> {
    let template_ctx = self.template_context(&inputs, ctx);

    let args = self
      .args
      .iter()
      .map(|t| render(t, &template_ctx).map_err(|e| ActionError::template(t, e)))
      .collect::<Result<Vec<_>, _>>()?;

    tokio::fs::create_dir_all(&ctx.work_dir).await?;

    debug!(
      node = %ctx.node,
      program = %self.program,
      args = ?args,
      "command_spawned"
    );

    let child = Command::new(&self.program)
      .args(&args)
      .envs(&self.env)
      .current_dir(&ctx.work_dir)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

    // Dropping the child on cancellation kills it.
    let output = tokio::select! {
      output = child.wait_with_output() => output?,
      _ = ctx.cancel.cancelled() => return Err(ActionError::Cancelled),
    };

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let start = stderr.len().saturating_sub(STDERR_TAIL);
      let start = (start..stderr.len())
        .find(|i| stderr.is_char_boundary(*i))
        .unwrap_or(stderr.len());
      return Err(ActionError::CommandFailed {
        program: self.program.clone(),
        status: output.status.to_string(),
        stderr: stderr[start..].trim().to_string(),
      });
    }

    let mut outputs = Outputs::new();
    for (port, template) in &self.outputs {
      let path = PathBuf::from(
        render(template, &template_ctx).map_err(|e| ActionError::template(template, e))?,
      );
      if !tokio::fs::try_exists(&path).await? {
        return Err(ActionError::MissingOutput {
          port: port.clone(),
          path,
        });
      }
      outputs.insert(port.clone(), Artifact::File(path));
    }

    Ok(outputs)
  }
}
