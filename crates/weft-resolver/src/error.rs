use thiserror::Error;
use weft_artifact::TemplateError;
use weft_workflow::{GraphError, ParameterError, SelectorError};

/// Errors that can occur during pipeline resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The graph failed validation.
  #[error(transparent)]
  Graph(#[from] GraphError),

  /// The iterables are malformed.
  #[error(transparent)]
  Parameter(#[from] ParameterError),

  /// An edge names a selection policy that does not exist.
  #[error("invalid selector on edge '{from}' -> '{to}'")]
  Selector {
    from: String,
    to: String,
    #[source]
    source: SelectorError,
  },

  /// A fixed value template could not be rendered.
  #[error("failed to render fixed input '{node}.{port}'")]
  Template {
    node: String,
    port: String,
    #[source]
    source: TemplateError,
  },

  /// An input is bound to an axis that is not among the iterables.
  #[error("node '{node}' is bound to unknown axis '{axis}'")]
  UnknownAxis { node: String, axis: String },

  /// A function action is not registered.
  #[error("node '{node}' references unregistered function '{function}'")]
  UnknownFunction { node: String, function: String },
}
