//! Run lifecycle events.
//!
//! The executor reports every status transition both as a `tracing` record
//! and as an [`ExecutionEvent`] handed to its notifier.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run has started.
  RunStarted { run_id: String, instances: usize },

  /// An action invocation was dispatched.
  InstanceStarted { run_id: String, instance: String },

  /// An invocation finished, either by running or from the cache.
  InstanceCompleted {
    run_id: String,
    instance: String,
    cached: bool,
  },

  /// An instance failed.
  InstanceFailed {
    run_id: String,
    instance: String,
    error: String,
  },

  /// An instance was skipped because an upstream instance failed.
  InstanceSkipped {
    run_id: String,
    instance: String,
    upstream: String,
  },

  /// An instance was cancelled.
  InstanceCancelled { run_id: String, instance: String },

  /// The run has finished. `failed` counts FAILED instances.
  RunCompleted { run_id: String, failed: usize },
}

/// Receives run events. Called from worker tasks, so it must not block.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// Forwards events to an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // A closed receiver just stops observing.
    let _ = self.sender.send(event);
  }
}
