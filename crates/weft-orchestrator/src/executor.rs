//! Plan executor.
//!
//! A single dispatcher owns the readiness counters and the status table.
//! Ready instances are handed to spawned workers; the dispatcher never waits
//! on an action itself. Workers take a permit from a shared semaphore only
//! around the action invocation, so a mapped instance waiting for its
//! elements does not hold a slot.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, instrument, warn};
use weft_action::{ActionContext, ActionError, Inputs, Outputs};
use weft_artifact::Artifact;
use weft_config::{CancelPolicy, EngineConfig};
use weft_store::{CacheEntry, CacheStore};
use weft_workflow::{IterationContext, Node};

use crate::cache::{CacheKey, KeyLocks};
use crate::error::InstanceError;
use crate::events::{ExecutionEvent, ExecutionNotifier, NoopNotifier};
use crate::input::resolve_inputs;
use crate::plan::{ExecutionPlan, PlanInstance, fan_out};
use crate::result::{InstanceReport, InstanceStatus, RunResult};

/// Runs execution plans against a cache store.
///
/// Generic over `N: ExecutionNotifier` to allow different notification
/// strategies. Use `Executor::new()` for no-op notifications, or
/// `Executor::with_notifier()` to observe events.
pub struct Executor<N: ExecutionNotifier = NoopNotifier> {
  store: Arc<dyn CacheStore>,
  config: EngineConfig,
  notifier: Arc<N>,
}

impl Executor<NoopNotifier> {
  pub fn new(store: Arc<dyn CacheStore>, config: EngineConfig) -> Self {
    Self::with_notifier(store, config, NoopNotifier)
  }
}

impl<N: ExecutionNotifier + 'static> Executor<N> {
  pub fn with_notifier(store: Arc<dyn CacheStore>, config: EngineConfig, notifier: N) -> Self {
    Self {
      store,
      config,
      notifier: Arc::new(notifier),
    }
  }

  /// Execute every instance of `plan`, running at most `concurrency_limit`
  /// actions at once.
  ///
  /// Returns once every instance is done, cached, failed, skipped or
  /// cancelled. Runtime failures never abort the run; they are reported per
  /// instance.
  pub async fn run(
    &self,
    plan: &ExecutionPlan,
    concurrency_limit: usize,
    cancel: CancellationToken,
  ) -> RunResult {
    let run_id = uuid::Uuid::new_v4().to_string();
    self
      .execute(run_id, plan, concurrency_limit.max(1), cancel)
      .await
  }

  #[instrument(
    name = "run_execute",
    skip(self, plan, cancel),
    fields(run_id = %run_id, instances = plan.len())
  )]
  async fn execute(
    &self,
    run_id: String,
    plan: &ExecutionPlan,
    limit: usize,
    cancel: CancellationToken,
  ) -> RunResult {
    info!(
      run_id = %run_id,
      instances = plan.len(),
      contexts = plan.contexts().len(),
      concurrency = limit,
      "run_started"
    );
    self.notifier.notify(ExecutionEvent::RunStarted {
      run_id: run_id.clone(),
      instances: plan.len(),
    });

    let action_cancel = match self.config.cancel_policy {
      CancelPolicy::Terminate => cancel.clone(),
      CancelPolicy::RunToCompletion => CancellationToken::new(),
    };
    let invoker = Arc::new(Invoker {
      run_id: run_id.clone(),
      store: Arc::clone(&self.store),
      notifier: Arc::clone(&self.notifier),
      locks: KeyLocks::default(),
      permits: Semaphore::new(limit),
      work_dir: self.config.work_dir.clone(),
      run_cancel: cancel.clone(),
      action_cancel,
    });

    let mut state = RunState::new(plan);
    let mut tasks: JoinSet<(usize, Result<Vec<Invocation>, ()>)> = JoinSet::new();
    let mut cancelled = false;

    loop {
      if !cancelled && cancel.is_cancelled() {
        cancelled = true;
        self.cancel_pending(&run_id, &mut state);
      }

      if !cancelled {
        while let Some(index) = state.ready.pop_front() {
          self.dispatch(&run_id, &mut state, &mut tasks, &invoker, index);
        }
      }

      if tasks.is_empty() {
        break;
      }

      tokio::select! {
        joined = tasks.join_next() => match joined {
          Some(Ok((index, result))) => self.complete(&run_id, &mut state, index, result),
          Some(Err(e)) => error!(run_id = %run_id, error = %e, "worker_join_failed"),
          None => break,
        },
        _ = cancel.cancelled(), if !cancelled => {
          warn!(run_id = %run_id, "run_cancelled");
          cancelled = true;
          self.cancel_pending(&run_id, &mut state);
        }
      }
    }

    // Anything still unsettled lost its worker; never drop it silently.
    self.cancel_pending(&run_id, &mut state);

    let result = RunResult {
      run_id: run_id.clone(),
      instances: state.reports.into_iter().flatten().collect(),
    };
    let summary = result.summary();
    info!(
      run_id = %run_id,
      done = summary.done,
      cached = summary.cached,
      failed = summary.failed,
      skipped = summary.skipped,
      cancelled = summary.cancelled,
      "run_completed"
    );
    self.notifier.notify(ExecutionEvent::RunCompleted {
      run_id,
      failed: summary.failed,
    });

    result
  }

  /// Resolve inputs, fan out, and hand the invocations to a worker.
  fn dispatch(
    &self,
    run_id: &str,
    state: &mut RunState<'_>,
    tasks: &mut JoinSet<(usize, Result<Vec<Invocation>, ()>)>,
    invoker: &Arc<Invoker<N>>,
    index: usize,
  ) {
    let plan = state.plan;
    let instance = &plan.instances()[index];

    let jobs = match resolve_inputs(instance, &state.outputs).and_then(|inputs| jobs_for(instance, inputs)) {
      Ok(jobs) => jobs,
      Err(e) => {
        error!(run_id = %run_id, instance = %instance.label(), error = %e, "instance_failed");
        self.notifier.notify(ExecutionEvent::InstanceFailed {
          run_id: run_id.to_string(),
          instance: instance.label(),
          error: e.to_string(),
        });
        state.reports[index].push(report(
          instance,
          instance.label(),
          None,
          InstanceStatus::Failed {
            reason: e.to_string(),
          },
        ));
        self.fail(run_id, state, index, instance.label());
        return;
      }
    };

    // A mapped instance over an empty list: no invocations, empty lists out.
    if jobs.is_empty() {
      let outputs: Outputs = instance
        .node
        .output_ports()
        .iter()
        .map(|port| (port.clone(), Artifact::empty_list()))
        .collect();
      info!(run_id = %run_id, instance = %instance.label(), "instance_completed");
      let mut entry = report(instance, instance.label(), None, InstanceStatus::Done);
      entry.outputs = Some(outputs.clone());
      state.reports[index].push(entry);
      state.succeed(index, outputs);
      return;
    }

    state.in_flight[index] = true;
    let invoker = Arc::clone(invoker);
    tasks.spawn(async move {
      let work = join_all(jobs.into_iter().map(|job| invoker.invoke(job)));
      let result = AssertUnwindSafe(work).catch_unwind().await.map_err(|_| ());
      (index, result)
    });
  }

  /// Record the invocations of a finished worker and release dependents.
  fn complete(
    &self,
    run_id: &str,
    state: &mut RunState<'_>,
    index: usize,
    result: Result<Vec<Invocation>, ()>,
  ) {
    state.in_flight[index] = false;
    let plan = state.plan;
    let instance = &plan.instances()[index];

    let Ok(invocations) = result else {
      error!(run_id = %run_id, instance = %instance.label(), "worker_panicked");
      state.reports[index].push(report(
        instance,
        instance.label(),
        None,
        InstanceStatus::Failed {
          reason: "action panicked".to_string(),
        },
      ));
      self.fail(run_id, state, index, instance.label());
      return;
    };

    let mut failed: Option<String> = None;
    let mut cancelled = false;
    let mut produced = Vec::with_capacity(invocations.len());

    for invocation in invocations {
      let (status, outputs) = match invocation.result {
        Ok((outputs, true)) => (InstanceStatus::Cached, Some(outputs)),
        Ok((outputs, false)) => (InstanceStatus::Done, Some(outputs)),
        Err(InstanceError::Cancelled) => {
          cancelled = true;
          (InstanceStatus::Cancelled, None)
        }
        Err(e) => {
          failed.get_or_insert_with(|| invocation.label.clone());
          (
            InstanceStatus::Failed {
              reason: e.to_string(),
            },
            None,
          )
        }
      };

      if let Some(outputs) = &outputs {
        produced.push(outputs.clone());
      }
      let mut entry = report(instance, invocation.label, invocation.element, status);
      entry.cache_key = invocation.cache_key;
      entry.outputs = outputs;
      state.reports[index].push(entry);
    }

    if let Some(upstream) = failed {
      self.fail(run_id, state, index, upstream);
    } else if cancelled {
      state.settled[index] = Some(Settled::Cancelled);
      self.cascade_cancel(run_id, state, index);
    } else if instance.is_mapped() {
      let outputs = collect_mapped(&instance.node, produced);
      state.succeed(index, outputs);
    } else if let Some(outputs) = produced.pop() {
      state.succeed(index, outputs);
    }
  }

  /// Mark `index` failed and skip everything downstream of it.
  fn fail(&self, run_id: &str, state: &mut RunState<'_>, index: usize, upstream: String) {
    state.settled[index] = Some(Settled::Failed);

    let plan = state.plan;
    let mut queue: VecDeque<usize> = plan.dependents(index).iter().copied().collect();
    while let Some(next) = queue.pop_front() {
      if state.settled[next].is_some() || state.in_flight[next] {
        continue;
      }
      let instance = &plan.instances()[next];
      info!(
        run_id = %run_id,
        instance = %instance.label(),
        upstream = %upstream,
        "instance_skipped"
      );
      self.notifier.notify(ExecutionEvent::InstanceSkipped {
        run_id: run_id.to_string(),
        instance: instance.label(),
        upstream: upstream.clone(),
      });
      state.settled[next] = Some(Settled::Skipped);
      state.reports[next].push(report(
        instance,
        instance.label(),
        None,
        InstanceStatus::Skipped {
          upstream: upstream.clone(),
        },
      ));
      queue.extend(plan.dependents(next).iter().copied());
    }
  }

  fn cascade_cancel(&self, run_id: &str, state: &mut RunState<'_>, index: usize) {
    let mut queue: VecDeque<usize> = state.plan.dependents(index).iter().copied().collect();
    while let Some(next) = queue.pop_front() {
      if state.settled[next].is_some() || state.in_flight[next] {
        continue;
      }
      self.mark_cancelled(run_id, state, next);
      queue.extend(state.plan.dependents(next).iter().copied());
    }
  }

  /// Cancel every instance that is neither settled nor running.
  fn cancel_pending(&self, run_id: &str, state: &mut RunState<'_>) {
    state.ready.clear();
    for index in 0..state.plan.len() {
      if state.settled[index].is_none() && !state.in_flight[index] {
        self.mark_cancelled(run_id, state, index);
      }
    }
  }

  fn mark_cancelled(&self, run_id: &str, state: &mut RunState<'_>, index: usize) {
    let plan = state.plan;
    let instance = &plan.instances()[index];
    self.notifier.notify(ExecutionEvent::InstanceCancelled {
      run_id: run_id.to_string(),
      instance: instance.label(),
    });
    state.settled[index] = Some(Settled::Cancelled);
    state.reports[index].push(report(
      instance,
      instance.label(),
      None,
      InstanceStatus::Cancelled,
    ));
  }
}

/// Final state of a plan instance as seen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
  Succeeded,
  Failed,
  Skipped,
  Cancelled,
}

/// Dispatcher-owned status table and readiness counters.
struct RunState<'p> {
  plan: &'p ExecutionPlan,
  /// Unsettled producers per instance.
  waiting: Vec<usize>,
  settled: Vec<Option<Settled>>,
  outputs: Vec<Option<Arc<Outputs>>>,
  reports: Vec<Vec<InstanceReport>>,
  ready: VecDeque<usize>,
  in_flight: Vec<bool>,
}

impl<'p> RunState<'p> {
  fn new(plan: &'p ExecutionPlan) -> Self {
    let waiting: Vec<usize> = plan.instances().iter().map(|i| i.deps.len()).collect();
    let ready = waiting
      .iter()
      .enumerate()
      .filter(|(_, w)| **w == 0)
      .map(|(i, _)| i)
      .collect();
    Self {
      plan,
      waiting,
      settled: vec![None; plan.len()],
      outputs: vec![None; plan.len()],
      reports: vec![Vec::new(); plan.len()],
      ready,
      in_flight: vec![false; plan.len()],
    }
  }

  fn succeed(&mut self, index: usize, outputs: Outputs) {
    self.settled[index] = Some(Settled::Succeeded);
    self.outputs[index] = Some(Arc::new(outputs));
    let plan = self.plan;
    for &next in plan.dependents(index) {
      self.waiting[next] = self.waiting[next].saturating_sub(1);
      if self.waiting[next] == 0 && self.settled[next].is_none() {
        self.ready.push_back(next);
      }
    }
  }
}

/// One action invocation: a scalar instance or one mapped element.
struct Job {
  node: Arc<Node>,
  context: Arc<IterationContext>,
  label: String,
  element: Option<usize>,
  inputs: Inputs,
}

struct Invocation {
  label: String,
  element: Option<usize>,
  cache_key: Option<String>,
  /// Outputs and whether they came from the cache.
  result: Result<(Outputs, bool), InstanceError>,
}

fn jobs_for(instance: &PlanInstance, inputs: Inputs) -> Result<Vec<Job>, InstanceError> {
  let job = |label: String, element: Option<usize>, inputs: Inputs| Job {
    node: Arc::clone(&instance.node),
    context: Arc::clone(&instance.context),
    label,
    element,
    inputs,
  };

  if !instance.is_mapped() {
    return Ok(vec![job(instance.label(), None, inputs)]);
  }

  Ok(
    fan_out(&instance.node, &inputs)?
      .into_iter()
      .enumerate()
      .map(|(i, inputs)| job(instance.element_label(i), Some(i), inputs))
      .collect(),
  )
}

/// Outputs of a mapped instance: one list per port, in element order.
fn collect_mapped(node: &Node, elements: Vec<Outputs>) -> Outputs {
  node
    .output_ports()
    .iter()
    .map(|port| {
      let items = elements
        .iter()
        .filter_map(|outputs| outputs.get(port).cloned())
        .collect();
      (port.clone(), Artifact::List(items))
    })
    .collect()
}

fn report(
  instance: &PlanInstance,
  label: String,
  element: Option<usize>,
  status: InstanceStatus,
) -> InstanceReport {
  InstanceReport {
    instance: label,
    node: instance.node.name().to_string(),
    context: instance.context.to_json(),
    element,
    status,
    cache_key: None,
    outputs: None,
  }
}

/// State shared by all workers of one run.
struct Invoker<N> {
  run_id: String,
  store: Arc<dyn CacheStore>,
  notifier: Arc<N>,
  locks: KeyLocks,
  permits: Semaphore,
  work_dir: PathBuf,
  run_cancel: CancellationToken,
  action_cancel: CancellationToken,
}

impl<N: ExecutionNotifier> Invoker<N> {
  async fn invoke(&self, job: Job) -> Invocation {
    let Job {
      node,
      context,
      label,
      element,
      inputs,
    } = job;

    let key = match CacheKey::compute(&node, &inputs) {
      Ok(key) => key,
      Err(source) => {
        let error = InstanceError::Cache {
          node: node.name().to_string(),
          source,
        };
        self.report_failure(&label, &error);
        return Invocation {
          label,
          element,
          cache_key: None,
          result: Err(error),
        };
      }
    };

    let result = self
      .invoke_keyed(&node, &context, &label, &key, inputs)
      .instrument(info_span!("instance", instance = %label))
      .await;

    match &result {
      Ok((_, cached)) => {
        let event = if *cached {
          "instance_cached"
        } else {
          "instance_completed"
        };
        info!(run_id = %self.run_id, instance = %label, cache_key = %key.short(), "{}", event);
        self.notifier.notify(ExecutionEvent::InstanceCompleted {
          run_id: self.run_id.clone(),
          instance: label.clone(),
          cached: *cached,
        });
      }
      Err(InstanceError::Cancelled) => {
        warn!(run_id = %self.run_id, instance = %label, "instance_cancelled");
        self.notifier.notify(ExecutionEvent::InstanceCancelled {
          run_id: self.run_id.clone(),
          instance: label.clone(),
        });
      }
      Err(e) => self.report_failure(&label, e),
    }

    Invocation {
      label,
      element,
      cache_key: Some(key.to_string()),
      result,
    }
  }

  async fn invoke_keyed(
    &self,
    node: &Node,
    context: &IterationContext,
    label: &str,
    key: &CacheKey,
    inputs: Inputs,
  ) -> Result<(Outputs, bool), InstanceError> {
    // Identical keys run one at a time, so only the first one invokes.
    let _guard = if node.is_cacheable() {
      let guard = self.locks.acquire(key).await;
      let entry = self
        .store
        .get(key.as_str())
        .await
        .map_err(|e| InstanceError::Cache {
          node: node.name().to_string(),
          source: e.into(),
        })?;
      if let Some(entry) = entry {
        return Ok((entry.outputs, true));
      }
      Some(guard)
    } else {
      None
    };

    if self.run_cancel.is_cancelled() {
      return Err(InstanceError::Cancelled);
    }
    let permit = tokio::select! {
      permit = self.permits.acquire() => permit.map_err(|_| InstanceError::Cancelled)?,
      _ = self.run_cancel.cancelled() => return Err(InstanceError::Cancelled),
    };

    info!(
      run_id = %self.run_id,
      instance = %label,
      action = %node.action().name(),
      "instance_started"
    );
    self.notifier.notify(ExecutionEvent::InstanceStarted {
      run_id: self.run_id.clone(),
      instance: label.to_string(),
    });

    // Outputs mirroring an unbound optional input are reported as empty lists.
    let unbound: Vec<String> = node
      .output_ports()
      .iter()
      .filter(|port| !inputs.contains_key(*port))
      .filter(|port| node.input_port(port).is_some_and(|input| !input.required))
      .cloned()
      .collect();

    let ctx = ActionContext {
      node: node.name().to_string(),
      instance: label.to_string(),
      context: context.to_json(),
      work_dir: self.work_dir.join(node.name()).join(key.short()),
      cancel: self.action_cancel.clone(),
    };
    let invoked = node.action().invoke(inputs, &ctx).await;
    drop(permit);

    let mut outputs = invoked.map_err(|source| match source {
      ActionError::Cancelled => InstanceError::Cancelled,
      source => InstanceError::Action {
        node: node.name().to_string(),
        source,
      },
    })?;

    for port in unbound {
      outputs.entry(port).or_insert_with(Artifact::empty_list);
    }
    if let Some(port) = node
      .output_ports()
      .iter()
      .find(|port| !outputs.contains_key(*port))
    {
      return Err(InstanceError::MissingOutput {
        node: node.name().to_string(),
        port: port.clone(),
      });
    }
    outputs.retain(|port, _| node.has_output(port));

    if node.is_cacheable() {
      let entry = CacheEntry::done(key.as_str(), outputs.clone());
      if let Err(e) = self.store.put(&entry).await {
        warn!(instance = %label, error = %e, "cache_write_failed");
      }
    }

    Ok((outputs, false))
  }

  fn report_failure(&self, label: &str, error: &InstanceError) {
    error!(run_id = %self.run_id, instance = %label, error = %error, "instance_failed");
    self.notifier.notify(ExecutionEvent::InstanceFailed {
      run_id: self.run_id.clone(),
      instance: label.to_string(),
      error: error.to_string(),
    });
  }
}
