//! Expansion of a frozen graph into an execution plan.
//!
//! The expander unrolls the logical graph once per iteration context of the
//! parameter set. Every node becomes one [`PlanInstance`] per context, with
//! axis-bound inputs replaced by that context's concrete values. Mapped
//! instances are split into per-element invocations by [`fan_out`]; when all
//! mapped ports are fixed the width is already known here, otherwise it is
//! decided once the producers have completed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use weft_action::Inputs;
use weft_artifact::Artifact;
use weft_workflow::{FrozenGraph, IterationContext, Node, ParameterSet, Selector};

use crate::error::{ExpandError, InstanceError};

/// Where an input port of a plan instance gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
  /// A fixed parameter or an axis value.
  Fixed(Artifact),
  /// A single incoming edge.
  Edge(EdgeBinding),
  /// Several incoming edges, delivered as a list in connection order.
  Aggregate(Vec<EdgeBinding>),
}

/// An edge resolved to the producing plan instance.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeBinding {
  /// Index of the producing instance in the plan.
  pub from: usize,
  /// Output port on the producer.
  pub port: String,
  pub selector: Selector,
}

/// Number of element invocations of a mapped instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapWidth {
  /// Every mapped port is fixed, so the width is known before running.
  Known(usize),
  /// Depends on upstream outputs.
  Deferred,
}

/// One node realized for one iteration context.
#[derive(Debug, Clone)]
pub struct PlanInstance {
  pub index: usize,
  pub node: Arc<Node>,
  pub context: Arc<IterationContext>,
  pub bindings: BTreeMap<String, Binding>,
  /// Producing instances, deduplicated, in ascending order.
  pub deps: Vec<usize>,
  /// `None` for scalar nodes.
  pub width: Option<MapWidth>,
}

impl PlanInstance {
  /// `node[axis=value,...]`, or just the node name for an empty context.
  pub fn label(&self) -> String {
    instance_label(self.node.name(), &self.context, None)
  }

  /// Label of one element invocation of a mapped instance.
  pub fn element_label(&self, element: usize) -> String {
    instance_label(self.node.name(), &self.context, Some(element))
  }

  pub fn is_mapped(&self) -> bool {
    self.width.is_some()
  }
}

pub(crate) fn instance_label(node: &str, context: &IterationContext, element: Option<usize>) -> String {
  let mut label = node.to_string();
  if !context.values.is_empty() {
    label.push_str(&format!("[{}]", context.label()));
  }
  if let Some(element) = element {
    label.push_str(&format!("[{}]", element));
  }
  label
}

/// A DAG of plan instances, ready for scheduling.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
  instances: Vec<PlanInstance>,
  contexts: Vec<Arc<IterationContext>>,
  dependents: Vec<Vec<usize>>,
}

impl ExecutionPlan {
  /// Instances grouped by context, each group in topological order.
  pub fn instances(&self) -> &[PlanInstance] {
    &self.instances
  }

  pub fn get(&self, index: usize) -> Option<&PlanInstance> {
    self.instances.get(index)
  }

  pub fn len(&self) -> usize {
    self.instances.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instances.is_empty()
  }

  pub fn contexts(&self) -> &[Arc<IterationContext>] {
    &self.contexts
  }

  /// Instances consuming an output of `index`.
  pub fn dependents(&self, index: usize) -> &[usize] {
    self
      .dependents
      .get(index)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Instance and invocation counts per node, without executing anything.
  pub fn summary(&self) -> PlanSummary {
    let mut nodes: Vec<NodeSummary> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for instance in &self.instances {
      let name = instance.node.name();
      let position = *positions.entry(name).or_insert_with(|| {
        nodes.push(NodeSummary {
          node: name.to_string(),
          instances: 0,
          mapped: instance.is_mapped(),
          invocations: Some(0),
          deferred: 0,
        });
        nodes.len() - 1
      });

      let summary = &mut nodes[position];
      summary.instances += 1;
      match instance.width {
        None => summary.invocations = summary.invocations.map(|n| n + 1),
        Some(MapWidth::Known(width)) => summary.invocations = summary.invocations.map(|n| n + width),
        Some(MapWidth::Deferred) => {
          summary.invocations = None;
          summary.deferred += 1;
        }
      }
    }

    PlanSummary {
      contexts: self.contexts.len(),
      instances: self.instances.len(),
      deferred_groups: nodes.iter().map(|n| n.deferred).sum(),
      nodes,
    }
  }
}

/// Result of the plan operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
  pub contexts: usize,
  pub instances: usize,
  /// Mapped instances whose width is only known at run time.
  pub deferred_groups: usize,
  pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
  pub node: String,
  pub instances: usize,
  pub mapped: bool,
  /// Total action invocations, if known before running.
  pub invocations: Option<usize>,
  pub deferred: usize,
}

/// Unroll `graph` over every iteration context of `parameters`.
pub fn expand(graph: &FrozenGraph, parameters: &ParameterSet) -> Result<ExecutionPlan, ExpandError> {
  let contexts: Vec<Arc<IterationContext>> = parameters.contexts().into_iter().map(Arc::new).collect();
  let order = graph.topological_order();
  let mut instances = Vec::with_capacity(contexts.len() * order.len());

  for context in &contexts {
    let mut by_node: HashMap<&str, usize> = HashMap::new();

    for name in order {
      let Some(node) = graph.node(name) else {
        continue;
      };
      let index = instances.len();
      let mut bindings = BTreeMap::new();

      for port in node.input_ports() {
        if let Some(value) = node.fixed_inputs().get(&port.name) {
          bindings.insert(port.name.clone(), Binding::Fixed(value.clone()));
          continue;
        }

        if let Some(axis) = node.axis_bindings().get(&port.name) {
          let value = context.get(axis).ok_or_else(|| ExpandError::UnknownAxis {
            node: node.name().to_string(),
            axis: axis.clone(),
          })?;
          bindings.insert(port.name.clone(), Binding::Fixed(Artifact::from_json(value.clone())));
          continue;
        }

        let edges: Vec<EdgeBinding> = graph
          .incoming(node.name(), &port.name)
          .filter_map(|edge| {
            by_node.get(edge.from.node.as_str()).map(|&from| EdgeBinding {
              from,
              port: edge.from.port.clone(),
              selector: edge.selector,
            })
          })
          .collect();

        match edges.len() {
          0 => {}
          1 if !port.aggregate => {
            if let Some(edge) = edges.into_iter().next() {
              bindings.insert(port.name.clone(), Binding::Edge(edge));
            }
          }
          _ => {
            bindings.insert(port.name.clone(), Binding::Aggregate(edges));
          }
        }
      }

      let mut deps: Vec<usize> = bindings
        .values()
        .flat_map(|binding| match binding {
          Binding::Fixed(_) => Vec::new(),
          Binding::Edge(edge) => vec![edge.from],
          Binding::Aggregate(edges) => edges.iter().map(|e| e.from).collect(),
        })
        .collect();
      deps.sort_unstable();
      deps.dedup();

      let width = node.is_mapped().then(|| static_width(node, &bindings));

      instances.push(PlanInstance {
        index,
        node: Arc::clone(node),
        context: Arc::clone(context),
        bindings,
        deps,
        width,
      });
      by_node.insert(name.as_str(), index);
    }
  }

  let mut dependents = vec![Vec::new(); instances.len()];
  for instance in &instances {
    for &dep in &instance.deps {
      dependents[dep].push(instance.index);
    }
  }

  Ok(ExecutionPlan {
    instances,
    contexts,
    dependents,
  })
}

fn static_width(node: &Node, bindings: &BTreeMap<String, Binding>) -> MapWidth {
  let mut widths = node.map_over().iter().map(|port| match bindings.get(port) {
    Some(Binding::Fixed(value)) => Some(value.as_list().map_or(1, <[Artifact]>::len)),
    _ => None,
  });

  let Some(Some(first)) = widths.next() else {
    return MapWidth::Deferred;
  };
  if widths.all(|w| w == Some(first)) {
    MapWidth::Known(first)
  } else {
    MapWidth::Deferred
  }
}

/// Split resolved inputs into one input set per mapped element.
///
/// Every mapped port must hold a list of the same length N (a non-list value
/// counts as a list of one). Element `i` of each mapped port goes to
/// invocation `i`; all other inputs are shared. Scalar nodes yield their
/// inputs unchanged, and N = 0 yields no invocations.
pub fn fan_out(node: &Node, inputs: &Inputs) -> Result<Vec<Inputs>, InstanceError> {
  if node.map_over().is_empty() {
    return Ok(vec![inputs.clone()]);
  }

  let mut columns: Vec<(&str, Vec<Artifact>)> = Vec::with_capacity(node.map_over().len());
  for port in node.map_over() {
    let value = inputs.get(port).ok_or_else(|| InstanceError::MissingInput {
      node: node.name().to_string(),
      port: port.clone(),
    })?;
    columns.push((port.as_str(), value.clone().into_elements()));
  }

  let width = columns[0].1.len();
  if columns.iter().any(|(_, items)| items.len() != width) {
    return Err(InstanceError::MapLengthMismatch {
      node: node.name().to_string(),
      lengths: columns
        .iter()
        .map(|(port, items)| format!("{}={}", port, items.len()))
        .collect::<Vec<_>>()
        .join(", "),
    });
  }

  let shared: Inputs = inputs
    .iter()
    .filter(|(port, _)| !node.is_mapped_port(port))
    .map(|(port, value)| (port.clone(), value.clone()))
    .collect();

  let mut elements = vec![shared; width];
  for (port, items) in columns {
    for (element, item) in elements.iter_mut().zip(items) {
      element.insert(port.to_string(), item);
    }
  }

  Ok(elements)
}
