//! Action errors.

use std::path::PathBuf;

use weft_artifact::{SinkWriteError, TemplateError};

/// Errors an action can fail with. The engine wraps them with the node name.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
  /// A data source could not resolve a required path.
  #[error("no data found for '{field}' (pattern '{pattern}')")]
  DataNotFound { field: String, pattern: String },

  /// A required input was not delivered.
  #[error("missing required input '{0}'")]
  MissingInput(String),

  /// An input had an unexpected shape.
  #[error("invalid input '{port}': {message}")]
  InvalidInput { port: String, message: String },

  /// A template could not be rendered.
  #[error("failed to render '{template}': {source}")]
  Template {
    template: String,
    #[source]
    source: TemplateError,
  },

  /// An external command exited unsuccessfully.
  #[error("command '{program}' failed ({status}): {stderr}")]
  CommandFailed {
    program: String,
    status: String,
    stderr: String,
  },

  /// A declared output file was not produced.
  #[error("output '{port}' not produced at '{}'", path.display())]
  MissingOutput { port: String, path: PathBuf },

  /// Depositing to a sink failed.
  #[error(transparent)]
  Sink(#[from] SinkWriteError),

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The action was asked to terminate.
  #[error("action cancelled")]
  Cancelled,

  /// Any other action-specific failure.
  #[error("{0}")]
  Failed(String),
}

impl ActionError {
  pub fn failed(message: impl Into<String>) -> Self {
    Self::Failed(message.into())
  }

  pub fn template(template: &str, source: TemplateError) -> Self {
    Self::Template {
      template: template.to_string(),
      source,
    }
  }

  pub fn is_data_not_found(&self) -> bool {
    matches!(self, Self::DataNotFound { .. })
  }
}
