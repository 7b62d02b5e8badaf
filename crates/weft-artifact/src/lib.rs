//! Weft Artifact
//!
//! This crate provides the [`Artifact`] value that flows along pipeline edges
//! and the [`Sink`] trait used to persist final artifacts into an organized
//! output tree.
//!
//! An artifact is either a structured value, a reference to a file on disk,
//! or an ordered list of artifacts (the output of a mapped node). The engine
//! never mutates artifacts in place; consumers receive clones or references.
//!
//! The [`FsSink`] implementation copies file artifacts with async streaming so
//! large images do not need to be held in memory.

mod artifact;
mod fs;
mod template;

pub use artifact::Artifact;
pub use fs::FsSink;
pub use template::{TemplateError, render};

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

/// A boxed stream of bytes for artifact data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Error type for sink deposits.
#[derive(Debug, thiserror::Error)]
pub enum SinkWriteError {
  /// The destination template could not be rendered.
  #[error("failed to render destination '{template}': {source}")]
  Template {
    template: String,
    #[source]
    source: TemplateError,
  },

  /// The rendered destination is absolute or climbs out of the sink root.
  #[error("destination '{0}' escapes the sink base directory")]
  InvalidDestination(String),

  /// An I/O error occurred while writing.
  #[error("failed to write '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// Several independent deposits failed.
  #[error("{} deposit(s) failed: {}", .0.len(), join_errors(.0))]
  Multiple(Vec<SinkWriteError>),
}

fn join_errors(errors: &[SinkWriteError]) -> String {
  errors
    .iter()
    .map(|e| e.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

/// Sink storage trait.
///
/// A sink copies or links the data behind an artifact to a destination derived
/// by rendering `destination` against the iteration context values. Each call
/// is independent: a failed deposit never affects other deposits.
#[async_trait]
pub trait Sink: Send + Sync {
  /// Deposit an artifact and return the paths that were written.
  async fn deposit(
    &self,
    artifact: &Artifact,
    destination: &str,
    context: &serde_json::Value,
  ) -> Result<Vec<PathBuf>, SinkWriteError>;
}
