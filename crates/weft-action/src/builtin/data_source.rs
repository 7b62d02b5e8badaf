use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use weft_artifact::{Artifact, render};

use crate::{Action, ActionContext, ActionError, Inputs, Outputs, inputs_to_json};

/// Locates input data for one iteration context.
#[async_trait]
pub trait DataSource: Send + Sync {
  /// Resolve the requested output names to file paths.
  ///
  /// `context` carries the values templates may refer to (e.g. `subject_id`).
  /// Failing to resolve a requested output is [`ActionError::DataNotFound`].
  async fn grab(
    &self,
    context: &serde_json::Value,
    outputs: &[String],
  ) -> Result<Outputs, ActionError>;
}

/// A data source that renders per-field path templates and expands wildcards.
///
/// ```json
/// {
///   "base_directory": "/data",
///   "field_templates": {
///     "anat": "{{ subject_id }}/anatomy/highres001.nii.gz",
///     "bold": "{{ subject_id }}/BOLD/task001_r*/bold.nii.gz"
///   },
///   "sorted": true
/// }
/// ```
///
/// A field matching a single file yields [`Artifact::File`]; several matches
/// yield an [`Artifact::List`] of files.
#[derive(Debug, Clone)]
pub struct TemplateDataSource {
  base_directory: PathBuf,
  field_templates: BTreeMap<String, String>,
  sorted: bool,
}

impl TemplateDataSource {
  pub fn new(base_directory: impl Into<PathBuf>) -> Self {
    Self {
      base_directory: base_directory.into(),
      field_templates: BTreeMap::new(),
      sorted: true,
    }
  }

  pub fn field(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
    self.field_templates.insert(name.into(), template.into());
    self
  }

  pub fn sorted(mut self, sorted: bool) -> Self {
    self.sorted = sorted;
    self
  }
}

#[async_trait]
impl DataSource for TemplateDataSource {
  async fn grab(
    &self,
    context: &serde_json::Value,
    outputs: &[String],
  ) -> Result<Outputs, ActionError> {
    let mut grabbed = Outputs::new();

    for field in outputs {
      let template = self
        .field_templates
        .get(field)
        .ok_or_else(|| ActionError::DataNotFound {
          field: field.clone(),
          pattern: String::new(),
        })?;
      let relative = render(template, context).map_err(|e| ActionError::template(template, e))?;
      let pattern = self.base_directory.join(relative).display().to_string();

      let sorted = self.sorted;
      let glob_pattern = pattern.clone();
      let matches = tokio::task::spawn_blocking(move || expand_glob(&glob_pattern, sorted))
        .await
        .map_err(|e| ActionError::failed(format!("glob task failed: {}", e)))??;

      debug!(field = %field, pattern = %pattern, matches = matches.len(), "data_grabbed");

      let artifact = match matches.len() {
        0 => {
          return Err(ActionError::DataNotFound {
            field: field.clone(),
            pattern,
          });
        }
        1 => Artifact::File(matches.into_iter().next().unwrap_or_default()),
        _ => Artifact::List(matches.into_iter().map(Artifact::File).collect()),
      };
      grabbed.insert(field.clone(), artifact);
    }

    Ok(grabbed)
  }
}

fn expand_glob(pattern: &str, sorted: bool) -> Result<Vec<PathBuf>, ActionError> {
  let entries = glob::glob(pattern).map_err(|e| ActionError::InvalidInput {
    port: "pattern".to_string(),
    message: format!("invalid pattern '{}': {}", pattern, e),
  })?;
  let mut paths: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
  if sorted {
    paths.sort();
  }
  Ok(paths)
}

/// Wraps a [`DataSource`] as a node action.
///
/// The node's inputs (e.g. `subject_id`) form the template context; the
/// declared outputs are the fields requested from the source.
pub struct DataSourceAction {
  source: Arc<dyn DataSource>,
  outputs: Vec<String>,
}

impl DataSourceAction {
  pub fn new(source: Arc<dyn DataSource>, outputs: Vec<String>) -> Self {
    Self { source, outputs }
  }
}

#[async_trait]
impl Action for DataSourceAction {
  fn name(&self) -> &str {
    "datasource"
  }

  async fn invoke(&self, inputs: Inputs, _ctx: &ActionContext) -> Result<Outputs, ActionError> {
    let context = serde_json::Value::Object(inputs_to_json(&inputs));
    self.source.grab(&context, &self.outputs).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_expand_glob_sorts_matches() {
    let dir = tempfile::tempdir().unwrap();
    for run in ["task001_r2", "task001_r1"] {
      let run_dir = dir.path().join(run);
      std::fs::create_dir_all(&run_dir).unwrap();
      std::fs::write(run_dir.join("bold.nii.gz"), "x").unwrap();
    }

    let pattern = dir.path().join("task001_r*/bold.nii.gz");
    let paths = expand_glob(&pattern.display().to_string(), true).unwrap();

    assert_eq!(paths.len(), 2);
    assert!(paths[0].starts_with(dir.path().join("task001_r1")));
  }

  #[tokio::test]
  async fn test_missing_field_template_is_data_not_found() {
    let source = TemplateDataSource::new("/data");
    let err = source
      .grab(&json!({}), &["anat".to_string()])
      .await
      .unwrap_err();
    assert!(err.is_data_not_found());
  }
}
