//! An incremental, dependency-aware build engine.
//!
//! Given a declarative description of tasks (commands with working
//! directories) and the resources they read and write, mason executes exactly
//! the tasks required to bring outputs into agreement with inputs. Implicit
//! dependencies observed during execution are recorded in the state store so
//! the next run is minimal.
//!
//! The pieces, bottom up: [`diff`] is the linear-time sorted-difference
//! primitive; [`state`] is the single-file transactional store for vertices,
//! edges, and pending sets; [`graph`] snapshots the store into a bipartite
//! dependency graph (see the `mason_graph` crate); [`sync`] reconciles a
//! parsed description against the store; [`exec`] walks the pending subgraph
//! in parallel and commits task outcomes. [`Engine`] ties them together for
//! the CLI.

pub mod diff;
pub mod error;
pub mod exec;
pub mod graph;
pub mod render;
pub mod resource;
pub mod rules;
pub mod runner;
pub mod scan;
pub mod state;
pub mod sync;
pub mod task;

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use error::{BuildError, StateError};
pub use exec::{BuildSummary, CancelToken, ExecuteOptions, TaskFailure};
pub use resource::{Resource, ResourceStatus};
pub use rules::{Description, Rule};
pub use runner::{CommandRunner, ProcessRunner, RunOutput};
pub use scan::{FsScanner, Scan};
pub use state::{EdgeKind, ResourceId, StateStore, TaskId};
pub use sync::SyncStats;
pub use task::Task;

/// Derives the conventional state file path for a description:
/// `<description>.state` next to it.
pub fn state_path_for(description: &Path) -> PathBuf {
  let mut path = OsString::from(description.as_os_str());
  path.push(".state");
  PathBuf::from(path)
}

/// What [`Engine::clean`] did.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct CleanStats {
  /// Output files deleted from disk.
  pub files_removed: usize,
  /// Producing tasks marked pending so the next build regenerates them.
  pub tasks_marked: usize,
}

/// Pending work as stored, for the status report.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct StatusReport {
  pub resource_count: usize,
  pub task_count: usize,
  pub pending_resources: Vec<(ResourceId, String)>,
  pub pending_tasks: Vec<(TaskId, String)>,
}

/// One build: a description file and its state store.
#[derive(Debug)]
pub struct Engine {
  store: StateStore,
  description_path: PathBuf,
  state_path: PathBuf,
}

impl Engine {
  /// Opens (creating if necessary) the state store belonging to the
  /// description at `description_path`.
  pub fn open(description_path: impl Into<PathBuf>) -> Result<Self, BuildError> {
    let description_path = description_path.into();
    let state_path = state_path_for(&description_path);
    let store = StateStore::open(&state_path)?;
    Ok(Self { store, description_path, state_path })
  }

  #[inline]
  pub fn store(&self) -> &StateStore { &self.store }
  #[inline]
  pub fn store_mut(&mut self) -> &mut StateStore { &mut self.store }
  #[inline]
  pub fn description_path(&self) -> &Path { &self.description_path }
  #[inline]
  pub fn state_path(&self) -> &Path { &self.state_path }

  /// Parses the description and reconciles the store against it in one write
  /// transaction.
  pub fn sync(&mut self, scanner: &dyn Scan) -> Result<SyncStats, BuildError> {
    let description = Description::load(&self.description_path)?;
    let tx = self.store.transaction()?;
    let stats = sync::sync(&tx, &description, scanner)?;
    tx.commit()?;
    Ok(stats)
  }

  /// Executes everything pending. Call [`Engine::sync`] first, or use
  /// [`Engine::build`].
  pub fn execute(
    &mut self,
    runner: &dyn CommandRunner,
    scanner: &dyn Scan,
    options: &ExecuteOptions,
    cancel: &CancelToken,
  ) -> Result<BuildSummary, BuildError> {
    exec::execute(&mut self.store, runner, scanner, options, cancel)
  }

  /// Sync followed by execute.
  pub fn build(
    &mut self,
    runner: &dyn CommandRunner,
    scanner: &dyn Scan,
    options: &ExecuteOptions,
    cancel: &CancelToken,
  ) -> Result<(SyncStats, BuildSummary), BuildError> {
    let stats = self.sync(scanner)?;
    let summary = self.execute(runner, scanner, options, cancel)?;
    Ok((stats, summary))
  }

  /// Deletes every output listed by the tasks' explicitly-originated
  /// out-edges and marks the producing tasks pending so the next build
  /// regenerates them.
  pub fn clean(&mut self) -> Result<CleanStats, BuildError> {
    let mut stats = CleanStats::default();
    let tasks = self.store.tasks()?;
    let tx = self.store.transaction()?;
    for (task, _) in tasks {
      let mut produced_any = false;
      for (resource, kind) in tx.outgoing_of_task(task)? {
        if !kind.is_explicit() {
          continue;
        }
        let mut stored = tx.resource(resource)?;
        match std::fs::remove_file(&stored.path) {
          Ok(()) => stats.files_removed += 1,
          Err(e) if e.kind() == ErrorKind::NotFound => {}
          Err(e) => return Err(e.into()),
        }
        stored.status = ResourceStatus::Missing;
        stored.checksum = Vec::new();
        tx.update_resource(resource, &stored)?;
        produced_any = true;
      }
      if produced_any {
        tx.add_pending_task(task)?;
        stats.tasks_marked += 1;
      }
    }
    tx.commit()?;
    tracing::info!(?stats, "cleaned outputs");
    Ok(stats)
  }

  /// Deletes the state file itself. Consumes the engine: the connection must
  /// be closed before the file goes away.
  pub fn purge(self) -> Result<(), BuildError> {
    let Self { store, state_path, .. } = self;
    drop(store);
    match std::fs::remove_file(&state_path) {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
      Err(e) => Err(e.into()),
    }
  }

  /// Experimental: removes every vertex with no incident edges (the
  /// description aside). Returns (resources removed, tasks removed).
  pub fn gc(&mut self) -> Result<(usize, usize), BuildError> {
    let tx = self.store.transaction()?;
    let (resources, tasks) = tx.islands()?;
    let counts = (resources.len(), tasks.len());
    for id in resources {
      tx.remove_resource(id)?;
    }
    for id in tasks {
      tx.remove_task(id)?;
    }
    tx.commit()?;
    Ok(counts)
  }

  /// Snapshot of stored pending work with human-readable names.
  pub fn status(&self) -> Result<StatusReport, BuildError> {
    let mut report = StatusReport {
      resource_count: self.store.resources()?.len(),
      task_count: self.store.tasks()?.len(),
      ..StatusReport::default()
    };
    for id in self.store.pending_resources()? {
      report.pending_resources.push((id, self.store.resource(id)?.path));
    }
    for id in self.store.pending_tasks()? {
      report.pending_tasks.push((id, self.store.task(id)?.name()));
    }
    Ok(report)
  }
}
