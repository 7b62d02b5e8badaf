//! Input resolution: gather upstream outputs and apply edge selectors.

use std::sync::Arc;

use tracing::warn;
use weft_action::{Inputs, Outputs};
use weft_artifact::Artifact;
use weft_workflow::SelectorError;

use crate::error::InstanceError;
use crate::plan::{Binding, EdgeBinding, PlanInstance};

/// Resolve the inputs of a plan instance from the outputs of its producers.
///
/// `outputs[i]` holds the outputs of plan instance `i` once it succeeded.
/// Selectors run here, between producer completion and consumer dispatch. A
/// failing selector on an aggregate port only drops that edge while another
/// edge still delivers, and leaves an optional port unbound; otherwise it
/// fails the instance.
pub fn resolve_inputs(
  instance: &PlanInstance,
  outputs: &[Option<Arc<Outputs>>],
) -> Result<Inputs, InstanceError> {
  let node = instance.node.name();
  let mut inputs = Inputs::new();

  for (port, binding) in &instance.bindings {
    let required = instance
      .node
      .input_port(port)
      .is_some_and(|p| p.required);

    match binding {
      Binding::Fixed(value) => {
        inputs.insert(port.clone(), value.clone());
      }
      Binding::Edge(edge) => match deliver(node, port, edge, outputs)? {
        Ok(value) => {
          inputs.insert(port.clone(), value);
        }
        Err(source) if !required => {
          warn!(node = %node, port = %port, error = %source, "optional_input_dropped");
        }
        Err(source) => {
          return Err(InstanceError::Selector {
            node: node.to_string(),
            port: port.clone(),
            source,
          });
        }
      },
      Binding::Aggregate(edges) => {
        let mut values = Vec::with_capacity(edges.len());
        let mut first_error = None;
        for edge in edges {
          match deliver(node, port, edge, outputs)? {
            Ok(value) => values.push(value),
            Err(source) => {
              warn!(node = %node, port = %port, error = %source, "aggregate_edge_dropped");
              first_error.get_or_insert(source);
            }
          }
        }

        match first_error {
          Some(source) if values.is_empty() && required => {
            return Err(InstanceError::Selector {
              node: node.to_string(),
              port: port.clone(),
              source,
            });
          }
          Some(_) if values.is_empty() => {}
          _ => {
            inputs.insert(port.clone(), Artifact::List(values));
          }
        }
      }
    }
  }

  Ok(inputs)
}

/// Fetch the upstream value for one edge and apply its selector. The outer
/// error means the producer never delivered; the inner one is the selector's.
fn deliver(
  node: &str,
  port: &str,
  edge: &EdgeBinding,
  outputs: &[Option<Arc<Outputs>>],
) -> Result<Result<Artifact, SelectorError>, InstanceError> {
  let value = outputs
    .get(edge.from)
    .and_then(Option::as_ref)
    .and_then(|produced| produced.get(&edge.port))
    .ok_or_else(|| InstanceError::MissingInput {
      node: node.to_string(),
      port: port.to_string(),
    })?;
  Ok(edge.selector.apply(value))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use weft_action::{Action, Identity};
  use weft_workflow::{InputPort, IterationContext, Node, Selector};

  fn instance(node: Node, bindings: Vec<(&str, Binding)>) -> PlanInstance {
    PlanInstance {
      index: 1,
      node: Arc::new(node),
      context: Arc::new(IterationContext::empty()),
      bindings: bindings
        .into_iter()
        .map(|(port, binding)| (port.to_string(), binding))
        .collect::<BTreeMap<_, _>>(),
      deps: vec![0],
      width: None,
    }
  }

  fn edge(port: &str, selector: Selector) -> EdgeBinding {
    EdgeBinding {
      from: 0,
      port: port.to_string(),
      selector,
    }
  }

  fn produced() -> Vec<Option<Arc<Outputs>>> {
    vec![Some(Arc::new(Outputs::from([
      (
        "roi_file".to_string(),
        Artifact::List(vec![Artifact::file("r1.nii"), Artifact::file("r2.nii")]),
      ),
      ("empty".to_string(), Artifact::empty_list()),
    ])))]
  }

  fn identity() -> Arc<dyn Action> {
    Arc::new(Identity)
  }

  #[test]
  fn test_selector_applied_to_edge() {
    let node = Node::new("coregister", identity())
      .inputs(["reference", "dof"])
      .fixed("dof", serde_json::json!(6));
    let instance = instance(
      node,
      vec![
        ("reference", Binding::Edge(edge("roi_file", Selector::First))),
        ("dof", Binding::Fixed(Artifact::value(6))),
      ],
    );

    let inputs = resolve_inputs(&instance, &produced()).unwrap();
    assert_eq!(inputs["reference"], Artifact::file("r1.nii"));
    assert_eq!(inputs["dof"], Artifact::value(6));
  }

  #[test]
  fn test_selector_failure_on_required_port() {
    let node = Node::new("coregister", identity()).inputs(["reference"]);
    let instance = instance(
      node,
      vec![("reference", Binding::Edge(edge("roi_file", Selector::Index(9))))],
    );

    let err = resolve_inputs(&instance, &produced()).unwrap_err();
    assert!(matches!(
      err,
      InstanceError::Selector {
        source: SelectorError::IndexOutOfRange { index: 9, len: 2 },
        ..
      }
    ));
  }

  #[test]
  fn test_selector_failure_on_optional_port_unbinds_it() {
    let node = Node::new("n", identity()).input(InputPort::optional("hint"));
    let instance = instance(
      node,
      vec![("hint", Binding::Edge(edge("empty", Selector::First)))],
    );

    let inputs = resolve_inputs(&instance, &produced()).unwrap();
    assert!(!inputs.contains_key("hint"));
  }

  #[test]
  fn test_aggregate_keeps_successful_edges() {
    let node = Node::new("merge", identity()).input(InputPort::required("files").aggregate());
    let instance = instance(
      node,
      vec![(
        "files",
        Binding::Aggregate(vec![
          edge("empty", Selector::First),
          edge("roi_file", Selector::Last),
        ]),
      )],
    );

    let inputs = resolve_inputs(&instance, &produced()).unwrap();
    assert_eq!(inputs["files"], Artifact::List(vec![Artifact::file("r2.nii")]));
  }

  #[test]
  fn test_missing_upstream_output() {
    let node = Node::new("n", identity()).inputs(["in"]);
    let instance = instance(node, vec![("in", Binding::Edge(edge("nope", Selector::Identity)))]);

    let err = resolve_inputs(&instance, &produced()).unwrap_err();
    assert!(matches!(err, InstanceError::MissingInput { .. }));
  }
}
