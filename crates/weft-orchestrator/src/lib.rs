//! Weft Orchestrator
//!
//! Expansion and execution of frozen pipeline graphs.
//!
//! ```text
//! FrozenGraph + ParameterSet
//!          │  expand()
//!          ▼
//!   ExecutionPlan      one PlanInstance per (node, iteration context)
//!          │  Executor::run()
//!          ▼
//!      RunResult       one report entry per instance, or per mapped element
//! ```
//!
//! The executor schedules instances as soon as their upstream instances have
//! settled, bounded by a concurrency limit on running actions. Each invocation
//! is fingerprinted into a [`CacheKey`]; a key that already has a stored
//! result is served from the [`weft_store::CacheStore`] instead of running
//! again, and concurrent invocations of the same key run once.
//!
//! Failures stay local: the failing instance is reported `FAILED` and every
//! instance downstream of it `SKIPPED`, while independent branches and other
//! iteration contexts carry on.

mod cache;
mod error;
mod events;
mod executor;
mod input;
mod plan;
mod result;

pub use cache::CacheKey;
pub use error::{ExpandError, InstanceError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::Executor;
pub use input::resolve_inputs;
pub use plan::{
  Binding, EdgeBinding, ExecutionPlan, MapWidth, NodeSummary, PlanInstance, PlanSummary, expand,
  fan_out,
};
pub use result::{InstanceReport, InstanceStatus, RunResult, RunSummary};
