//! Error types for expansion and instance execution.

use thiserror::Error;
use weft_action::ActionError;
use weft_workflow::SelectorError;

use crate::cache::CacheError;

/// Errors that can occur while expanding a graph into a plan.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
  /// A node input is bound to an axis the parameter set does not have.
  #[error("node '{node}' is bound to unknown axis '{axis}'")]
  UnknownAxis { node: String, axis: String },
}

/// Errors confined to a single execution instance.
#[derive(Debug, Error)]
pub enum InstanceError {
  /// The bound action failed.
  #[error("action failed for node '{node}': {source}")]
  Action {
    node: String,
    #[source]
    source: ActionError,
  },

  /// A selector on an incoming edge failed and the port has no alternative.
  #[error("selector failed on input '{node}.{port}': {source}")]
  Selector {
    node: String,
    port: String,
    #[source]
    source: SelectorError,
  },

  /// Mapped ports resolved to lists of different lengths.
  #[error("mapped inputs of node '{node}' differ in length: {lengths}")]
  MapLengthMismatch { node: String, lengths: String },

  /// An upstream instance did not deliver a value for an edge.
  #[error("input '{node}.{port}' has no value")]
  MissingInput { node: String, port: String },

  /// The action returned without a declared output.
  #[error("node '{node}' did not produce output '{port}'")]
  MissingOutput { node: String, port: String },

  /// The cache could not be consulted.
  #[error("cache error for node '{node}': {source}")]
  Cache {
    node: String,
    #[source]
    source: CacheError,
  },

  /// The run was cancelled before or during the invocation.
  #[error("cancelled")]
  Cancelled,
}
