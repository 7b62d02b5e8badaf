use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use weft_action::{Action, ActionContext, ActionError, Identity, Inputs, Outputs};
use weft_config::{CancelPolicy, EngineConfig};
use weft_orchestrator::{Executor, InstanceStatus, RunResult, expand};
use weft_store::MemoryStore;
use weft_workflow::{FrozenGraph, Graph, Node, ParameterSet};

/// Sleeps, optionally giving up as soon as the context is cancelled.
struct Slow {
  delay: Duration,
  honor_cancel: bool,
}

#[async_trait]
impl Action for Slow {
  fn name(&self) -> &str {
    "slow"
  }

  async fn invoke(&self, inputs: Inputs, ctx: &ActionContext) -> Result<Outputs, ActionError> {
    if self.honor_cancel {
      tokio::select! {
        _ = ctx.cancel.cancelled() => return Err(ActionError::Cancelled),
        _ = tokio::time::sleep(self.delay) => {}
      }
    } else {
      tokio::time::sleep(self.delay).await;
    }
    Ok(inputs)
  }
}

fn graph(slow: Slow) -> FrozenGraph {
  let mut graph = Graph::new("cancel");
  graph
    .add_node(
      Node::new("slow", Arc::new(slow))
        .inputs(["subject"])
        .bind_axis("subject", "subject")
        .outputs(["subject"]),
    )
    .unwrap();
  graph
    .add_node(
      Node::new("after", Arc::new(Identity))
        .inputs(["subject"])
        .outputs(["subject"]),
    )
    .unwrap();
  graph.connect("slow", "subject", "after", "subject").unwrap();
  graph.freeze().unwrap()
}

async fn run_cancelled_after(graph: &FrozenGraph, policy: CancelPolicy, delay: Duration) -> RunResult {
  let work = tempfile::tempdir().unwrap();
  let parameters = ParameterSet::new().with_axis("subject", ["s1"]).unwrap();
  let plan = expand(graph, &parameters).unwrap();
  let config = EngineConfig {
    work_dir: work.path().to_path_buf(),
    cancel_policy: policy,
    ..EngineConfig::default()
  };
  let executor = Executor::new(Arc::new(MemoryStore::new()), config);

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(delay).await;
    trigger.cancel();
  });

  tokio::time::timeout(Duration::from_secs(5), executor.run(&plan, 2, cancel))
    .await
    .expect("run did not settle after cancellation")
}

#[tokio::test]
async fn test_cancel_before_start_cancels_everything() {
  let work = tempfile::tempdir().unwrap();
  let graph = graph(Slow {
    delay: Duration::from_millis(10),
    honor_cancel: false,
  });
  let parameters = ParameterSet::new().with_axis("subject", ["s1", "s2"]).unwrap();
  let plan = expand(&graph, &parameters).unwrap();
  let config = EngineConfig {
    work_dir: work.path().to_path_buf(),
    ..EngineConfig::default()
  };

  let cancel = CancellationToken::new();
  cancel.cancel();
  let result = Executor::new(Arc::new(MemoryStore::new()), config)
    .run(&plan, 2, cancel)
    .await;

  assert_eq!(result.instances.len(), 4);
  assert!(result.instances.iter().all(|r| r.status == InstanceStatus::Cancelled));
}

#[tokio::test]
async fn test_run_to_completion_finishes_in_flight_work() {
  let graph = graph(Slow {
    delay: Duration::from_millis(300),
    honor_cancel: true,
  });

  let result = run_cancelled_after(&graph, CancelPolicy::RunToCompletion, Duration::from_millis(50)).await;

  // The action never sees the cancellation, so it finishes normally.
  assert_eq!(result.get("slow[subject=s1]").unwrap().status, InstanceStatus::Done);
  assert_eq!(result.get("after[subject=s1]").unwrap().status, InstanceStatus::Cancelled);
}

#[tokio::test]
async fn test_terminate_interrupts_in_flight_work() {
  let graph = graph(Slow {
    delay: Duration::from_secs(30),
    honor_cancel: true,
  });

  let result = run_cancelled_after(&graph, CancelPolicy::Terminate, Duration::from_millis(50)).await;

  assert_eq!(result.get("slow[subject=s1]").unwrap().status, InstanceStatus::Cancelled);
  assert_eq!(result.get("after[subject=s1]").unwrap().status, InstanceStatus::Cancelled);
  assert!(!result.has_failures());
}
