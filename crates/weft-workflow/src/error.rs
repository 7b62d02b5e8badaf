use thiserror::Error;

/// Build-time errors. A graph that fails validation is never frozen.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("node not found: {0}")]
  UnknownNode(String),

  #[error("duplicate node name: {0}")]
  DuplicateNode(String),

  #[error("node '{node}' declares {direction} port '{port}' more than once")]
  DuplicatePort {
    node: String,
    port: String,
    direction: &'static str,
  },

  #[error("node '{node}' has no {direction} port '{port}'")]
  UnknownPort {
    node: String,
    port: String,
    direction: &'static str,
  },

  #[error("input '{node}.{port}' is already bound")]
  DuplicateInput { node: String, port: String },

  #[error("cycle detected involving nodes: {}", nodes.join(" -> "))]
  CycleDetected { nodes: Vec<String> },

  #[error("input '{node}.{port}' is unbound: {reason}")]
  UnboundInput {
    node: String,
    port: String,
    reason: String,
  },
}

/// Errors building a parameter set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParameterError {
  #[error("duplicate axis name: {0}")]
  DuplicateAxis(String),
}

/// Errors applying an edge selector.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectorError {
  #[error("unknown selection policy: '{0}'")]
  UnknownPolicy(String),

  #[error("selector '{selector}' applied to an empty list")]
  EmptyList { selector: String },

  #[error("index {index} out of range for list of length {len}")]
  IndexOutOfRange { index: usize, len: usize },

  #[error("selector '{selector}' failed: {message}")]
  Failed { selector: String, message: String },
}
