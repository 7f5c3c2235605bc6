//! The parallel executor: walks the pending subgraph in topological order,
//! runs pending tasks through the command runner, reinterprets observed file
//! accesses as implicit edges, and commits each task's outcome in one short
//! write transaction.

use std::collections::{HashMap, HashSet};
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use mason_graph::{Decision, Release, WalkDriver};

use crate::diff::{Change, sorted_diff_by};
use crate::error::BuildError;
use crate::graph::{self, BuildGraph};
use crate::resource::Resource;
use crate::runner::{CommandRunner, RunOutput};
use crate::scan::Scan;
use crate::state::{self, EdgeKind, ResourceId, StateStore, StateTx, TaskId};

/// Cooperative cancellation. On cancel the walk stops releasing new work,
/// waits for in-flight tasks, and commits their results; the pending set is
/// preserved so the next run picks up where this one stopped.
#[derive(Clone, Default, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self { Self::default() }
  pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst); }
  pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// One task that exited nonzero (or failed to spawn). Failures are
/// accumulated, not raised: a single run reports all of them.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TaskFailure {
  pub task: TaskId,
  pub name: String,
  pub exit_code: i32,
  pub stderr: String,
}

/// What one execution pass did.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct BuildSummary {
  /// Tasks that ran to completion, in completion order.
  pub executed: Vec<(TaskId, String)>,
  pub failures: Vec<TaskFailure>,
  /// Dry-run only: names of the tasks that would have run.
  pub would_run: Vec<String>,
  pub cancelled: bool,
}

impl BuildSummary {
  /// True when no task failed. A cancelled run with no failures still counts
  /// as successful as far as exit status is concerned.
  #[inline]
  pub fn success(&self) -> bool { self.failures.is_empty() }
}

/// Executor configuration.
#[derive(Clone, Copy, Debug)]
pub struct ExecuteOptions {
  /// Worker pool size.
  pub threads: NonZeroUsize,
  /// Walk and report without invoking anything or touching the store.
  pub dry_run: bool,
}

impl Default for ExecuteOptions {
  fn default() -> Self {
    let threads = std::thread::available_parallelism()
      .unwrap_or(NonZeroUsize::new(1).expect("BUG: 1 is nonzero"));
    Self { threads, dry_run: false }
  }
}

/// Executes everything reachable from the pending sets.
///
/// Cycle detection runs before any task: a cycle that intersects the pending
/// subgraph aborts the run with a diagnostic naming all involved vertices.
pub fn execute(
  store: &mut StateStore,
  runner: &dyn CommandRunner,
  scanner: &dyn Scan,
  options: &ExecuteOptions,
  cancel: &CancelToken,
) -> Result<BuildSummary, BuildError> {
  let pending_resources = store.pending_resources()?;
  let pending_tasks = store.pending_tasks()?;
  if pending_resources.is_empty() && pending_tasks.is_empty() {
    tracing::info!("nothing is pending");
    return Ok(BuildSummary::default());
  }

  let graph = graph::snapshot(store)?;
  let subgraph = graph.subgraph(pending_resources.iter().copied(), pending_tasks.iter().copied());

  let cycles = graph::named_cycles(store, &subgraph)?;
  if !cycles.is_empty() {
    return Err(BuildError::Cycle(cycles));
  }

  let mut specs = HashMap::new();
  for id in subgraph.tasks() {
    specs.insert(id, store.task(id)?);
  }

  let mut driver = Driver {
    store,
    graph: &subgraph,
    specs: &specs,
    scanner,
    pending_resources: pending_resources.into_iter().collect(),
    pending_tasks: pending_tasks.into_iter().collect(),
    summary: BuildSummary::default(),
    dry_run: options.dry_run,
    cancel,
    error: None,
  };
  let run_task = |task: TaskId| {
    let spec = &specs[&task];
    runner.run(&spec.commands, &spec.working_dir)
  };
  let stats = subgraph.walk(options.threads, run_task, &mut driver);
  tracing::debug!(?stats, "walk finished");

  if let Some(error) = driver.error {
    return Err(error);
  }
  let mut summary = driver.summary;
  summary.cancelled = cancel.is_cancelled();
  Ok(summary)
}

/// Coordinator-side walk state. The store handle stays on this side of the
/// fence; workers only ever see the command runner.
struct Driver<'a> {
  store: &'a mut StateStore,
  graph: &'a BuildGraph,
  specs: &'a HashMap<TaskId, crate::task::Task>,
  scanner: &'a dyn Scan,
  /// In-memory view of the pending sets, kept in lockstep with the store
  /// (and standing in for it entirely during a dry run).
  pending_resources: HashSet<ResourceId>,
  pending_tasks: HashSet<TaskId>,
  summary: BuildSummary,
  dry_run: bool,
  cancel: &'a CancelToken,
  /// First store failure; fatal to the run, so it also cancels the walk.
  error: Option<BuildError>,
}

impl Driver<'_> {
  fn task_name(&self, task: TaskId) -> String {
    self.specs.get(&task).map(|t| t.name()).unwrap_or_else(|| format!("task {}", task.raw()))
  }

  /// A pending resource has changed: its consumers must run.
  fn propagate_resource(&mut self, resource: ResourceId) -> Result<(), BuildError> {
    if !self.pending_resources.remove(&resource) {
      return Ok(());
    }
    let consumers: Vec<TaskId> = self.graph.outgoing_of_resource(resource).map(|(t, _)| t).collect();
    self.pending_tasks.extend(consumers.iter().copied());
    if !self.dry_run {
      let tx = self.store.transaction()?;
      for task in consumers {
        tx.add_pending_task(task)?;
      }
      tx.remove_pending_resource(resource)?;
      tx.commit()?;
    }
    Ok(())
  }

  /// Commits everything a successful task execution changed: the implicit
  /// edge delta, output fingerprints, the execution timestamp, and pending
  /// membership. All of it lands in one transaction so a crash leaves the
  /// task either fully run or not run at all.
  fn apply_success(&mut self, task: TaskId, output: &RunOutput) -> Result<(), BuildError> {
    let tx = self.store.transaction()?;

    reconcile_reads(&tx, self.scanner, task, output)?;
    reconcile_writes(&tx, self.scanner, task, output)?;

    for (resource, _) in tx.outgoing_of_task(task)? {
      let mut stored = tx.resource(resource)?;
      let (status, checksum) = self.scanner.scan(&stored.path)?;
      if status != stored.status || checksum != stored.checksum {
        stored.status = status;
        stored.checksum = checksum;
        tx.update_resource(resource, &stored)?;
        tx.add_pending_resource(resource)?;
        self.pending_resources.insert(resource);
      } else {
        tx.remove_pending_resource(resource)?;
        self.pending_resources.remove(&resource);
      }
    }

    let mut spec = self.specs[&task].clone();
    spec.last_executed = state::now_ms();
    if output.display.is_some() {
      spec.display = output.display.clone();
    }
    tx.update_task(task, &spec)?;
    tx.remove_pending_task(task)?;
    tx.commit()?;

    self.pending_tasks.remove(&task);
    Ok(())
  }
}

impl WalkDriver<ResourceId, TaskId, io::Result<RunOutput>> for Driver<'_> {
  fn resource_ready(&mut self, resource: ResourceId) -> Release {
    match self.propagate_resource(resource) {
      Ok(()) => Release::Release,
      Err(error) => {
        self.error.get_or_insert(error);
        Release::Hold
      }
    }
  }

  fn task_ready(&mut self, task: TaskId) -> Decision {
    if !self.pending_tasks.contains(&task) {
      // Not pending: skip, but let downstream have its chance.
      return Decision::Skip;
    }
    if self.dry_run {
      self.summary.would_run.push(self.task_name(task));
      // Assume every output would change so downstream shows up too.
      let outputs: Vec<ResourceId> = self.graph.outgoing_of_task(task).map(|(r, _)| r).collect();
      self.pending_resources.extend(outputs);
      return Decision::Skip;
    }
    Decision::Run
  }

  fn task_finished(&mut self, task: TaskId, outcome: io::Result<RunOutput>) -> Release {
    let name = self.task_name(task);
    let output = match outcome {
      Err(error) => {
        tracing::error!(task = %name, %error, "task failed to spawn");
        self.summary.failures.push(TaskFailure {
          task,
          name,
          exit_code: -1,
          stderr: error.to_string(),
        });
        return Release::Hold;
      }
      Ok(output) if !output.success() => {
        tracing::error!(task = %name, exit_code = output.exit_code, "task failed");
        self.summary.failures.push(TaskFailure {
          task,
          name,
          exit_code: output.exit_code,
          stderr: output.stderr,
        });
        return Release::Hold;
      }
      Ok(output) => output,
    };

    match self.apply_success(task, &output) {
      Ok(()) => {
        tracing::info!(task = %name, "ran");
        self.summary.executed.push((task, name));
        Release::Release
      }
      Err(error) => {
        self.error.get_or_insert(error);
        Release::Hold
      }
    }
  }

  fn cancelled(&self) -> bool {
    self.cancel.is_cancelled() || self.error.is_some()
  }
}

/// Diffs observed reads against stored implicitly-originated in-edges.
fn reconcile_reads(
  tx: &StateTx,
  scanner: &dyn Scan,
  task: TaskId,
  output: &RunOutput,
) -> Result<(), BuildError> {
  let mut stored: Vec<(String, Option<ResourceId>)> = Vec::new();
  for (resource, kind) in tx.incoming_of_task(task)? {
    if kind.is_implicit() {
      stored.push((tx.resource(resource)?.path, Some(resource)));
    }
  }
  stored.sort_unstable_by(|a, b| a.0.cmp(&b.0));
  let observed: Vec<(String, Option<ResourceId>)> =
    output.reads.iter().map(|path| (path.clone(), None)).collect();

  for change in sorted_diff_by(stored, observed, |a, b| a.0.cmp(&b.0)) {
    match change {
      Change::Added((path, _)) => {
        let resource = observed_resource(tx, scanner, &path)?;
        match tx.edge_rt(resource, task)? {
          None => tx.put_edge_rt(resource, task, EdgeKind::Implicit)?,
          Some(EdgeKind::Explicit) => tx.set_edge_kind_rt(resource, task, EdgeKind::Both)?,
          Some(_) => {}
        }
      }
      Change::Removed((_, id)) => {
        let resource = id.expect("BUG: stored edge has no resource id");
        match tx.edge_rt(resource, task)? {
          Some(EdgeKind::Implicit) => tx.remove_edge_rt(resource, task)?,
          Some(EdgeKind::Both) => tx.set_edge_kind_rt(resource, task, EdgeKind::Explicit)?,
          _ => {}
        }
      }
      Change::Unchanged(_) => {}
    }
  }
  Ok(())
}

/// Diffs observed writes against stored implicitly-originated out-edges.
fn reconcile_writes(
  tx: &StateTx,
  scanner: &dyn Scan,
  task: TaskId,
  output: &RunOutput,
) -> Result<(), BuildError> {
  let mut stored: Vec<(String, Option<ResourceId>)> = Vec::new();
  for (resource, kind) in tx.outgoing_of_task(task)? {
    if kind.is_implicit() {
      stored.push((tx.resource(resource)?.path, Some(resource)));
    }
  }
  stored.sort_unstable_by(|a, b| a.0.cmp(&b.0));
  let observed: Vec<(String, Option<ResourceId>)> =
    output.writes.iter().map(|path| (path.clone(), None)).collect();

  for change in sorted_diff_by(stored, observed, |a, b| a.0.cmp(&b.0)) {
    match change {
      Change::Added((path, _)) => {
        let resource = observed_resource(tx, scanner, &path)?;
        match tx.edge_tr(task, resource)? {
          None => tx.put_edge_tr(task, resource, EdgeKind::Implicit)?,
          Some(EdgeKind::Explicit) => tx.set_edge_kind_tr(task, resource, EdgeKind::Both)?,
          Some(_) => {}
        }
      }
      Change::Removed((_, id)) => {
        let resource = id.expect("BUG: stored edge has no resource id");
        match tx.edge_tr(task, resource)? {
          Some(EdgeKind::Implicit) => tx.remove_edge_tr(task, resource)?,
          Some(EdgeKind::Both) => tx.set_edge_kind_tr(task, resource, EdgeKind::Explicit)?,
          _ => {}
        }
      }
      Change::Unchanged(_) => {}
    }
  }
  Ok(())
}

/// Looks up a resource first observed during execution, creating it with its
/// current scan so a later run can tell whether it changed since.
fn observed_resource(tx: &StateTx, scanner: &dyn Scan, path: &str) -> Result<ResourceId, BuildError> {
  if let Some(id) = tx.find_resource(path)? {
    return Ok(id);
  }
  let mut resource = Resource::new(path);
  let (status, checksum) = scanner.scan(path)?;
  resource.status = status;
  resource.checksum = checksum;
  Ok(tx.put_resource(&resource)?)
}
