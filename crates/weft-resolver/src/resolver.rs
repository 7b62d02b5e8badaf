use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use weft_action::{
  Action, CONTAINER_PORT, CommandAction, DataSourceAction, Identity, SinkAction, TemplateDataSource,
};
use weft_artifact::{Artifact, FsSink, TemplateError, render};
use weft_config::{ActionDef, EdgeDef, NodeDef, PipelineDef, PortDef};
use weft_workflow::{FrozenGraph, Graph, InputPort, Node, ParameterSet, Selector};

use crate::error::ResolveError;
use crate::registry::Registry;

/// A resolved pipeline, ready for expansion.
#[derive(Debug)]
pub struct Pipeline {
  pub pipeline_id: String,
  pub name: String,
  pub graph: FrozenGraph,
  pub parameters: ParameterSet,
}

/// Resolver transforms a PipelineDef into a frozen graph.
#[async_trait]
pub trait Resolver: Send + Sync {
  /// Resolve a pipeline definition.
  ///
  /// This process:
  /// 1. Renders `{{ params.* }}` templates into fixed inputs
  /// 2. Binds every node to its action
  /// 3. Connects edges, parsing selector tags
  /// 4. Freezes the graph (no cycles, every required input bound)
  async fn resolve(&self, def: PipelineDef) -> Result<Pipeline, ResolveError>;
}

/// Standard resolver implementation backed by a [`Registry`] of functions
/// and named selectors.
#[derive(Default)]
pub struct StandardResolver {
  registry: Registry,
}

impl StandardResolver {
  pub fn new(registry: Registry) -> Self {
    Self { registry }
  }

  fn resolve_node(&self, def: NodeDef, params: &Value) -> Result<Node, ResolveError> {
    let NodeDef {
      node_id,
      action,
      inputs,
      outputs,
      map_over,
      fixed,
      axes,
      cache,
    } = def;

    let outputs = if outputs.is_empty() {
      default_outputs(&action, &inputs)
    } else {
      outputs
    };
    let is_sink = matches!(action, ActionDef::Sink { .. });
    let bound = self.build_action(&node_id, action, &outputs)?;

    let mut node = Node::new(node_id.clone(), bound).outputs(outputs);
    for port in inputs {
      node = node.input(input_port(port));
    }
    if !map_over.is_empty() {
      node = node.mapped(map_over);
    }
    for (port, value) in fixed {
      let value = render_value(value, params).map_err(|source| ResolveError::Template {
        node: node_id.clone(),
        port: port.clone(),
        source,
      })?;
      node = node.fixed(port, Artifact::from_json(value));
    }
    for (port, axis) in axes {
      node = node.bind_axis(port, axis);
    }
    // Sinks always run so that a fully cached run still deposits.
    if is_sink || cache == Some(false) {
      node = node.uncached();
    }

    Ok(node)
  }

  fn build_action(
    &self,
    node_id: &str,
    action: ActionDef,
    outputs: &[String],
  ) -> Result<Arc<dyn Action>, ResolveError> {
    let bound: Arc<dyn Action> = match action {
      ActionDef::Identity => Arc::new(Identity),
      ActionDef::Command {
        program,
        args,
        produces,
        env,
        version,
      } => {
        let mut command = CommandAction::new(program).args(args);
        for (port, template) in produces {
          command = command.output(port, template);
        }
        for (key, value) in env {
          command = command.env(key, value);
        }
        if let Some(version) = version {
          command = command.with_version(version);
        }
        Arc::new(command)
      }
      ActionDef::DataSource {
        base_directory,
        field_templates,
        sorted,
      } => {
        let mut source = TemplateDataSource::new(base_directory).sorted(sorted);
        for (field, template) in field_templates {
          source = source.field(field, template);
        }
        Arc::new(DataSourceAction::new(Arc::new(source), outputs.to_vec()))
      }
      ActionDef::Function { function } => self
        .registry
        .get_function(&function)
        .cloned()
        .ok_or_else(|| ResolveError::UnknownFunction {
          node: node_id.to_string(),
          function,
        })?,
      ActionDef::Sink {
        base_directory,
        destinations,
      } => {
        let mut sink = SinkAction::new(Arc::new(FsSink::new(base_directory)));
        for (port, template) in destinations {
          sink = sink.with_destination(port, template);
        }
        Arc::new(sink)
      }
    };
    Ok(bound)
  }

  fn parse_selector(&self, edge: &EdgeDef) -> Result<Selector, ResolveError> {
    let Some(tag) = edge.selector.as_deref() else {
      return Ok(Selector::Identity);
    };
    if let Some(named) = self.registry.get_selector(tag) {
      return Ok(Selector::Named(named));
    }
    tag.parse().map_err(|source| ResolveError::Selector {
      from: format!("{}.{}", edge.from, edge.from_port),
      to: format!("{}.{}", edge.to, edge.to_port),
      source,
    })
  }
}

#[async_trait]
impl Resolver for StandardResolver {
  async fn resolve(&self, def: PipelineDef) -> Result<Pipeline, ResolveError> {
    let mut parameters = ParameterSet::new();
    for axis in def.iterables {
      parameters.add_axis(axis.name, axis.values)?;
    }

    let params = serde_json::json!({ "params": def.params });
    let mut graph = Graph::new(def.name.clone());

    for node_def in def.nodes {
      if let Some(axis) = node_def
        .axes
        .values()
        .find(|axis| parameters.get(axis).is_none())
      {
        return Err(ResolveError::UnknownAxis {
          node: node_def.node_id,
          axis: axis.clone(),
        });
      }
      let node = self.resolve_node(node_def, &params)?;
      debug!(node = %node.name(), action = %node.action().name(), "node_resolved");
      graph.add_node(node)?;
    }

    for edge in &def.edges {
      let selector = self.parse_selector(edge)?;
      graph.connect_with(&edge.from, &edge.from_port, &edge.to, &edge.to_port, selector)?;
    }

    let graph = graph.freeze()?;
    info!(
      pipeline_id = %def.pipeline_id,
      nodes = graph.nodes().len(),
      edges = graph.edges().len(),
      contexts = parameters.context_count(),
      "pipeline_resolved"
    );

    Ok(Pipeline {
      pipeline_id: def.pipeline_id,
      name: def.name,
      graph,
      parameters,
    })
  }
}

fn input_port(def: PortDef) -> InputPort {
  match def {
    PortDef::Name(name) => InputPort::required(name),
    PortDef::Full {
      name,
      required,
      list,
      aggregate,
    } => {
      let mut port = if required {
        InputPort::required(name)
      } else {
        InputPort::optional(name)
      };
      if aggregate {
        port = port.aggregate();
      } else if list {
        port = port.list();
      }
      port
    }
  }
}

/// Output ports implied by the action when none are declared.
fn default_outputs(action: &ActionDef, inputs: &[PortDef]) -> Vec<String> {
  match action {
    ActionDef::Command { produces, .. } => produces.keys().cloned().collect(),
    ActionDef::DataSource {
      field_templates, ..
    } => field_templates.keys().cloned().collect(),
    ActionDef::Identity => inputs.iter().map(|p| p.name().to_string()).collect(),
    ActionDef::Sink { .. } => inputs
      .iter()
      .map(|p| p.name().to_string())
      .filter(|name| name != CONTAINER_PORT)
      .collect(),
    ActionDef::Function { .. } => Vec::new(),
  }
}

/// Render templates inside a fixed value. A string that is a single
/// expression keeps the JSON type of its result, so `"{{ params.fwhm }}"`
/// becomes the number `8`.
fn render_value(value: Value, params: &Value) -> Result<Value, TemplateError> {
  match value {
    Value::String(template) if template.contains("{{") => {
      let rendered = render(&template, params)?;
      let trimmed = template.trim();
      let single = trimmed.starts_with("{{")
        && trimmed.ends_with("}}")
        && trimmed.matches("{{").count() == 1;
      if !single {
        return Ok(Value::String(rendered));
      }
      match serde_json::from_str(&rendered) {
        Ok(parsed) => Ok(parsed),
        Err(_) => Ok(Value::String(rendered)),
      }
    }
    Value::Array(items) => items
      .into_iter()
      .map(|item| render_value(item, params))
      .collect::<Result<Vec<_>, _>>()
      .map(Value::Array),
    Value::Object(map) => map
      .into_iter()
      .map(|(k, v)| render_value(v, params).map(|v| (k, v)))
      .collect::<Result<serde_json::Map<_, _>, _>>()
      .map(Value::Object),
    other => Ok(other),
  }
}
