use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

use weft_action::Action;
use weft_artifact::Artifact;

use crate::error::GraphError;

/// A named input slot on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPort {
  pub name: String,
  /// Must be fixed, axis-bound, or connected before the graph freezes.
  pub required: bool,
  /// Accepts a whole list (e.g. the collected outputs of a mapped node).
  pub list: bool,
  /// Accepts several edges, delivered as a list in connection order.
  pub aggregate: bool,
}

impl InputPort {
  pub fn required(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      required: true,
      list: false,
      aggregate: false,
    }
  }

  pub fn optional(name: impl Into<String>) -> Self {
    Self {
      required: false,
      ..Self::required(name)
    }
  }

  pub fn list(mut self) -> Self {
    self.list = true;
    self
  }

  pub fn aggregate(mut self) -> Self {
    self.aggregate = true;
    self.list = true;
    self
  }
}

/// Whether a node runs once, or once per element of its mapped inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeMode {
  #[default]
  Scalar,
  Mapped { map_over: Vec<String> },
}

/// A unit of work with named ports bound to an action.
#[derive(Clone)]
pub struct Node {
  name: String,
  action: Arc<dyn Action>,
  mode: NodeMode,
  inputs: Vec<InputPort>,
  outputs: Vec<String>,
  fixed: BTreeMap<String, Artifact>,
  axes: BTreeMap<String, String>,
  cacheable: bool,
}

impl Node {
  pub fn new(name: impl Into<String>, action: Arc<dyn Action>) -> Self {
    Self {
      name: name.into(),
      action,
      mode: NodeMode::Scalar,
      inputs: Vec::new(),
      outputs: Vec::new(),
      fixed: BTreeMap::new(),
      axes: BTreeMap::new(),
      cacheable: true,
    }
  }

  pub fn input(mut self, port: InputPort) -> Self {
    self.inputs.push(port);
    self
  }

  /// Declare required scalar inputs.
  pub fn inputs<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self
      .inputs
      .extend(names.into_iter().map(InputPort::required));
    self
  }

  pub fn output(mut self, name: impl Into<String>) -> Self {
    self.outputs.push(name.into());
    self
  }

  pub fn outputs<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.outputs.extend(names.into_iter().map(Into::into));
    self
  }

  /// Fan out over the given input ports.
  pub fn mapped<I, S>(mut self, map_over: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.mode = NodeMode::Mapped {
      map_over: map_over.into_iter().map(Into::into).collect(),
    };
    self
  }

  /// Set a fixed (non-connected) parameter value.
  pub fn fixed(mut self, port: impl Into<String>, value: impl Into<Artifact>) -> Self {
    self.fixed.insert(port.into(), value.into());
    self
  }

  /// Bind an input port to a parameter-set axis.
  pub fn bind_axis(mut self, port: impl Into<String>, axis: impl Into<String>) -> Self {
    self.axes.insert(port.into(), axis.into());
    self
  }

  /// Always run this node, never reuse a cached result.
  pub fn uncached(mut self) -> Self {
    self.cacheable = false;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn action(&self) -> &Arc<dyn Action> {
    &self.action
  }

  pub fn mode(&self) -> &NodeMode {
    &self.mode
  }

  pub fn is_mapped(&self) -> bool {
    matches!(self.mode, NodeMode::Mapped { .. })
  }

  /// Ports this node fans out over; empty for scalar nodes.
  pub fn map_over(&self) -> &[String] {
    match &self.mode {
      NodeMode::Mapped { map_over } => map_over,
      NodeMode::Scalar => &[],
    }
  }

  pub fn is_mapped_port(&self, port: &str) -> bool {
    self.map_over().iter().any(|p| p == port)
  }

  pub fn input_ports(&self) -> &[InputPort] {
    &self.inputs
  }

  pub fn input_port(&self, name: &str) -> Option<&InputPort> {
    self.inputs.iter().find(|p| p.name == name)
  }

  pub fn output_ports(&self) -> &[String] {
    &self.outputs
  }

  pub fn has_output(&self, name: &str) -> bool {
    self.outputs.iter().any(|p| p == name)
  }

  pub fn fixed_inputs(&self) -> &BTreeMap<String, Artifact> {
    &self.fixed
  }

  pub fn axis_bindings(&self) -> &BTreeMap<String, String> {
    &self.axes
  }

  pub fn is_cacheable(&self) -> bool {
    self.cacheable
  }

  /// Check port declarations for internal consistency.
  pub(crate) fn validate(&self) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for port in &self.inputs {
      if !seen.insert(port.name.as_str()) {
        return Err(self.duplicate_port(&port.name, "input"));
      }
    }

    let mut seen = HashSet::new();
    for port in &self.outputs {
      if !seen.insert(port.as_str()) {
        return Err(self.duplicate_port(port, "output"));
      }
    }

    let bound = self
      .map_over()
      .iter()
      .chain(self.fixed.keys())
      .chain(self.axes.keys());
    for port in bound {
      if self.input_port(port).is_none() {
        return Err(GraphError::UnknownPort {
          node: self.name.clone(),
          port: port.clone(),
          direction: "input",
        });
      }
    }

    if let Some(port) = self.fixed.keys().find(|p| self.axes.contains_key(*p)) {
      return Err(GraphError::DuplicateInput {
        node: self.name.clone(),
        port: port.clone(),
      });
    }

    Ok(())
  }

  fn duplicate_port(&self, port: &str, direction: &'static str) -> GraphError {
    GraphError::DuplicatePort {
      node: self.name.clone(),
      port: port.to_string(),
      direction,
    }
  }
}

impl fmt::Debug for Node {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Node")
      .field("name", &self.name)
      .field("action", &self.action.name())
      .field("mode", &self.mode)
      .field("inputs", &self.inputs)
      .field("outputs", &self.outputs)
      .field("fixed", &self.fixed)
      .field("axes", &self.axes)
      .field("cacheable", &self.cacheable)
      .finish()
  }
}
