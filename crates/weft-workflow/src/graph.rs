use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use crate::error::GraphError;
use crate::node::Node;
use crate::selector::Selector;

/// A `(node, port)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
  pub node: String,
  pub port: String,
}

impl PortRef {
  pub fn new(node: impl Into<String>, port: impl Into<String>) -> Self {
    Self {
      node: node.into(),
      port: port.into(),
    }
  }
}

impl fmt::Display for PortRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.node, self.port)
  }
}

/// A port-to-port connection with the selector applied on delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
  pub from: PortRef,
  pub to: PortRef,
  pub selector: Selector,
}

/// Mutable graph under construction.
#[derive(Debug, Clone)]
pub struct Graph {
  name: String,
  nodes: Vec<Node>,
  index: HashMap<String, usize>,
  edges: Vec<Edge>,
}

impl Graph {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      nodes: Vec::new(),
      index: HashMap::new(),
      edges: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
    node.validate()?;
    if self.index.contains_key(node.name()) {
      return Err(GraphError::DuplicateNode(node.name().to_string()));
    }
    self.index.insert(node.name().to_string(), self.nodes.len());
    self.nodes.push(node);
    Ok(())
  }

  pub fn node(&self, name: &str) -> Option<&Node> {
    self.index.get(name).map(|&i| &self.nodes[i])
  }

  /// Connect two ports, delivering the upstream value unchanged.
  pub fn connect(
    &mut self,
    src: &str,
    src_port: &str,
    dst: &str,
    dst_port: &str,
  ) -> Result<(), GraphError> {
    self.connect_with(src, src_port, dst, dst_port, Selector::Identity)
  }

  /// Connect two ports through a selector.
  pub fn connect_with(
    &mut self,
    src: &str,
    src_port: &str,
    dst: &str,
    dst_port: &str,
    selector: Selector,
  ) -> Result<(), GraphError> {
    let source = self
      .node(src)
      .ok_or_else(|| GraphError::UnknownNode(src.to_string()))?;
    if !source.has_output(src_port) {
      return Err(GraphError::UnknownPort {
        node: src.to_string(),
        port: src_port.to_string(),
        direction: "output",
      });
    }

    let target = self
      .node(dst)
      .ok_or_else(|| GraphError::UnknownNode(dst.to_string()))?;
    let port = target
      .input_port(dst_port)
      .ok_or_else(|| GraphError::UnknownPort {
        node: dst.to_string(),
        port: dst_port.to_string(),
        direction: "input",
      })?;

    let duplicate = GraphError::DuplicateInput {
      node: dst.to_string(),
      port: dst_port.to_string(),
    };
    if target.fixed_inputs().contains_key(dst_port) || target.axis_bindings().contains_key(dst_port) {
      return Err(duplicate);
    }
    if !port.aggregate && self.edges.iter().any(|e| e.to.node == dst && e.to.port == dst_port) {
      return Err(duplicate);
    }

    self.edges.push(Edge {
      from: PortRef::new(src, src_port),
      to: PortRef::new(dst, dst_port),
      selector,
    });
    Ok(())
  }

  /// Validate the graph and make it immutable.
  pub fn freeze(self) -> Result<FrozenGraph, GraphError> {
    self.detect_cycle()?;
    self.check_bindings()?;

    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    let mut reverse_adjacency: HashMap<String, Vec<String>> = HashMap::new();

    for node in &self.nodes {
      adjacency.entry(node.name().to_string()).or_default();
      reverse_adjacency.entry(node.name().to_string()).or_default();
    }

    for edge in &self.edges {
      let down = adjacency.entry(edge.from.node.clone()).or_default();
      if !down.contains(&edge.to.node) {
        down.push(edge.to.node.clone());
      }
      let up = reverse_adjacency.entry(edge.to.node.clone()).or_default();
      if !up.contains(&edge.from.node) {
        up.push(edge.from.node.clone());
      }
    }

    // Insertion order keeps entry points and topological order deterministic
    let entry_points: Vec<String> = self
      .nodes
      .iter()
      .map(|n| n.name().to_string())
      .filter(|id| reverse_adjacency.get(id).is_none_or(|v| v.is_empty()))
      .collect();

    let mut in_degree: HashMap<&str, usize> = reverse_adjacency
      .iter()
      .map(|(id, up)| (id.as_str(), up.len()))
      .collect();
    let mut queue: VecDeque<&str> = entry_points.iter().map(String::as_str).collect();
    let mut topological_order = Vec::with_capacity(self.nodes.len());

    while let Some(id) = queue.pop_front() {
      topological_order.push(id.to_string());
      for next in adjacency.get(id).into_iter().flatten() {
        if let Some(degree) = in_degree.get_mut(next.as_str()) {
          *degree -= 1;
          if *degree == 0 {
            queue.push_back(next.as_str());
          }
        }
      }
    }

    Ok(FrozenGraph {
      name: self.name,
      nodes: self.nodes.into_iter().map(Arc::new).collect(),
      index: self.index,
      edges: self.edges,
      adjacency,
      reverse_adjacency,
      entry_points,
      topological_order,
    })
  }

  /// DFS with coloring. A back edge closes a cycle; the grey path from its
  /// target to the current node is reported.
  fn detect_cycle(&self) -> Result<(), GraphError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
      White,
      Grey,
      Black,
    }

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
    for edge in &self.edges {
      if let (Some(&from), Some(&to)) = (self.index.get(&edge.from.node), self.index.get(&edge.to.node))
      {
        adjacency[from].push(to);
      }
    }

    fn dfs(
      node: usize,
      adjacency: &[Vec<usize>],
      color: &mut [Color],
      path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
      color[node] = Color::Grey;
      path.push(node);

      for &next in &adjacency[node] {
        match color[next] {
          Color::Grey => {
            let start = path.iter().position(|&n| n == next).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(next);
            return Some(cycle);
          }
          Color::White => {
            if let Some(cycle) = dfs(next, adjacency, color, path) {
              return Some(cycle);
            }
          }
          Color::Black => {}
        }
      }

      path.pop();
      color[node] = Color::Black;
      None
    }

    let mut color = vec![Color::White; self.nodes.len()];
    for start in 0..self.nodes.len() {
      if color[start] != Color::White {
        continue;
      }
      let mut path = Vec::new();
      if let Some(cycle) = dfs(start, &adjacency, &mut color, &mut path) {
        return Err(GraphError::CycleDetected {
          nodes: cycle
            .into_iter()
            .map(|i| self.nodes[i].name().to_string())
            .collect(),
        });
      }
    }

    Ok(())
  }

  fn check_bindings(&self) -> Result<(), GraphError> {
    for node in &self.nodes {
      for port in node.input_ports() {
        let bound = node.fixed_inputs().contains_key(&port.name)
          || node.axis_bindings().contains_key(&port.name)
          || self
            .edges
            .iter()
            .any(|e| e.to.node == node.name() && e.to.port == port.name);
        if port.required && !bound {
          return Err(GraphError::UnboundInput {
            node: node.name().to_string(),
            port: port.name.clone(),
            reason: "required input is not fixed, bound to an axis, or connected".to_string(),
          });
        }
      }
    }

    for edge in &self.edges {
      let (Some(source), Some(target)) = (self.node(&edge.from.node), self.node(&edge.to.node)) else {
        continue;
      };
      if !source.is_mapped() || !edge.selector.is_identity() {
        continue;
      }
      let accepts_list = target.is_mapped_port(&edge.to.port)
        || target.input_port(&edge.to.port).is_some_and(|p| p.list);
      if !accepts_list {
        return Err(GraphError::UnboundInput {
          node: edge.to.node.clone(),
          port: edge.to.port.clone(),
          reason: format!(
            "mapped output '{}' feeds a scalar input and needs a selector",
            edge.from
          ),
        });
      }
    }

    Ok(())
  }
}

/// A validated, immutable graph.
#[derive(Debug, Clone)]
pub struct FrozenGraph {
  name: String,
  nodes: Vec<Arc<Node>>,
  index: HashMap<String, usize>,
  edges: Vec<Edge>,
  /// node -> downstream nodes.
  adjacency: HashMap<String, Vec<String>>,
  /// node -> upstream nodes.
  reverse_adjacency: HashMap<String, Vec<String>>,
  /// Nodes with no incoming edges.
  entry_points: Vec<String>,
  topological_order: Vec<String>,
}

impl FrozenGraph {
  pub fn name(&self) -> &str {
    &self.name
  }

  /// Nodes in insertion order.
  pub fn nodes(&self) -> &[Arc<Node>] {
    &self.nodes
  }

  pub fn node(&self, name: &str) -> Option<&Arc<Node>> {
    self.index.get(name).map(|&i| &self.nodes[i])
  }

  pub fn edges(&self) -> &[Edge] {
    &self.edges
  }

  /// Edges into `node.port`, in connection order.
  pub fn incoming<'a>(&'a self, node: &'a str, port: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
    self
      .edges
      .iter()
      .filter(move |e| e.to.node == node && e.to.port == port)
  }

  pub fn entry_points(&self) -> &[String] {
    &self.entry_points
  }

  pub fn downstream(&self, node: &str) -> &[String] {
    self
      .adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  pub fn upstream(&self, node: &str) -> &[String] {
    self
      .reverse_adjacency
      .get(node)
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }

  /// Every node appears after all of its upstream nodes.
  pub fn topological_order(&self) -> &[String] {
    &self.topological_order
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::node::InputPort;
  use weft_action::{Action, Identity};

  fn identity() -> Arc<dyn Action> {
    Arc::new(Identity)
  }

  fn step(name: &str) -> Node {
    Node::new(name, identity()).inputs(["in"]).outputs(["out"])
  }

  fn chain(names: &[&str]) -> Graph {
    let mut graph = Graph::new("chain");
    graph
      .add_node(Node::new(names[0], identity()).outputs(["out"]))
      .unwrap();
    for name in &names[1..] {
      graph.add_node(step(name)).unwrap();
    }
    for pair in names.windows(2) {
      graph.connect(pair[0], "out", pair[1], "in").unwrap();
    }
    graph
  }

  #[test]
  fn test_freeze_linear_chain() {
    let frozen = chain(&["load", "strip", "register", "done"]).freeze().unwrap();

    assert_eq!(frozen.entry_points(), ["load"]);
    assert_eq!(frozen.topological_order(), ["load", "strip", "register", "done"]);
    assert_eq!(frozen.downstream("strip"), ["register"]);
    assert_eq!(frozen.upstream("strip"), ["load"]);
    assert_eq!(frozen.edges().len(), 3);
  }

  #[test]
  fn test_duplicate_node_rejected() {
    let mut graph = Graph::new("g");
    graph.add_node(step("a")).unwrap();
    assert_eq!(
      graph.add_node(step("a")).unwrap_err(),
      GraphError::DuplicateNode("a".to_string())
    );
  }

  #[test]
  fn test_connect_unknown_port() {
    let mut graph = chain(&["a", "b"]);
    let err = graph.connect("a", "missing", "b", "in").unwrap_err();
    assert!(matches!(err, GraphError::UnknownPort { direction: "output", .. }));

    let err = graph.connect("a", "out", "b", "missing").unwrap_err();
    assert!(matches!(err, GraphError::UnknownPort { direction: "input", .. }));
  }

  #[test]
  fn test_connect_unknown_node() {
    let mut graph = chain(&["a", "b"]);
    let err = graph.connect("a", "out", "zzz", "in").unwrap_err();
    assert_eq!(err, GraphError::UnknownNode("zzz".to_string()));
  }

  #[test]
  fn test_second_edge_into_port_rejected() {
    let mut graph = chain(&["a", "b"]);
    graph.add_node(Node::new("c", identity()).outputs(["out"])).unwrap();

    let err = graph.connect("c", "out", "b", "in").unwrap_err();
    assert_eq!(
      err,
      GraphError::DuplicateInput {
        node: "b".to_string(),
        port: "in".to_string(),
      }
    );
  }

  #[test]
  fn test_aggregate_port_accepts_many_edges() {
    let mut graph = Graph::new("g");
    graph.add_node(Node::new("a", identity()).outputs(["out"])).unwrap();
    graph.add_node(Node::new("b", identity()).outputs(["out"])).unwrap();
    graph
      .add_node(Node::new("merge", identity()).input(InputPort::required("in").aggregate()))
      .unwrap();

    graph.connect("a", "out", "merge", "in").unwrap();
    graph.connect("b", "out", "merge", "in").unwrap();

    let frozen = graph.freeze().unwrap();
    let sources: Vec<_> = frozen
      .incoming("merge", "in")
      .map(|e| e.from.node.as_str())
      .collect();
    assert_eq!(sources, ["a", "b"]);
  }

  #[test]
  fn test_connect_into_fixed_port_rejected() {
    let mut graph = Graph::new("g");
    graph.add_node(Node::new("a", identity()).outputs(["out"])).unwrap();
    graph
      .add_node(step("b").fixed("in", serde_json::json!(8)))
      .unwrap();

    let err = graph.connect("a", "out", "b", "in").unwrap_err();
    assert!(matches!(err, GraphError::DuplicateInput { .. }));
  }

  #[test]
  fn test_cycle_reports_participating_nodes() {
    let mut graph = Graph::new("g");
    graph.add_node(step("a")).unwrap();
    graph.add_node(step("b")).unwrap();
    graph.add_node(step("c")).unwrap();
    graph.connect("a", "out", "b", "in").unwrap();
    graph.connect("b", "out", "c", "in").unwrap();
    graph.connect("c", "out", "a", "in").unwrap();

    match graph.freeze().unwrap_err() {
      GraphError::CycleDetected { nodes } => {
        assert_eq!(nodes, ["a", "b", "c", "a"]);
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn test_self_loop_is_a_cycle() {
    let mut graph = Graph::new("g");
    graph.add_node(step("a")).unwrap();
    graph.connect("a", "out", "a", "in").unwrap();
    assert!(matches!(graph.freeze(), Err(GraphError::CycleDetected { .. })));
  }

  #[test]
  fn test_unbound_required_input() {
    let mut graph = Graph::new("g");
    graph.add_node(step("orphan")).unwrap();
    let err = graph.freeze().unwrap_err();
    assert!(matches!(err, GraphError::UnboundInput { ref port, .. } if port == "in"));
  }

  #[test]
  fn test_optional_and_axis_inputs_are_satisfied() {
    let mut graph = Graph::new("g");
    graph
      .add_node(
        Node::new("grab", identity())
          .input(InputPort::required("subject_id"))
          .input(InputPort::optional("session"))
          .bind_axis("subject_id", "subject_id")
          .outputs(["func"]),
      )
      .unwrap();
    assert!(graph.freeze().is_ok());
  }

  #[test]
  fn test_mapped_to_scalar_requires_selector() {
    let build = |selector: Selector| {
      let mut graph = Graph::new("g");
      graph
        .add_node(
          Node::new("realign", identity())
            .input(InputPort::required("in_files").list())
            .fixed("in_files", serde_json::json!(["r1", "r2"]))
            .mapped(["in_files"])
            .outputs(["mean"]),
        )
        .unwrap();
      graph.add_node(step("coregister")).unwrap();
      graph
        .connect_with("realign", "mean", "coregister", "in", selector)
        .unwrap();
      graph.freeze()
    };

    let err = build(Selector::Identity).unwrap_err();
    assert!(matches!(err, GraphError::UnboundInput { ref node, .. } if node == "coregister"));
    assert!(build(Selector::First).is_ok());
  }

  #[test]
  fn test_mapped_to_list_port_needs_no_selector() {
    let mut graph = Graph::new("g");
    graph
      .add_node(
        Node::new("smooth", identity())
          .inputs(["in_file"])
          .fixed("in_file", serde_json::json!(["a", "b"]))
          .mapped(["in_file"])
          .outputs(["smoothed"]),
      )
      .unwrap();
    graph
      .add_node(Node::new("sink", identity()).input(InputPort::required("files").list()))
      .unwrap();
    graph.connect("smooth", "smoothed", "sink", "files").unwrap();

    assert!(graph.freeze().is_ok());
  }
}
