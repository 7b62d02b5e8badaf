//! Weft Workflow
//!
//! This crate provides the logical pipeline representation for weft: nodes
//! with named ports bound to actions, port-to-port edges with optional
//! selectors, and the parameter sets that drive graph replication.
//!
//! A [`Graph`] is assembled incrementally and then frozen. Freezing validates
//! the structure and produces an immutable [`FrozenGraph`]:
//! - the graph is acyclic (cycles are reported with the participating nodes)
//! - every required input is fixed, bound to an axis, or connected
//! - mapped outputs reach scalar inputs only through a selector
//!
//! A frozen graph is what the expander turns into an execution plan.

mod error;
mod graph;
mod node;
mod parameter;
mod selector;

pub use error::{GraphError, ParameterError, SelectorError};
pub use graph::{Edge, FrozenGraph, Graph, PortRef};
pub use node::{InputPort, Node, NodeMode};
pub use parameter::{Axis, IterationContext, ParameterSet};
pub use selector::{NamedSelector, Selector, SelectorFn};
