//! Weft Resolver
//!
//! Turns a [`weft_config::PipelineDef`] into a [`Pipeline`]: a frozen graph
//! plus the parameter set that drives its replication. This is the "build"
//! step; every structural error surfaces here, before anything runs.

mod error;
mod registry;
mod resolver;

pub use error::ResolveError;
pub use registry::Registry;
pub use resolver::{Pipeline, Resolver, StandardResolver};
