//! Reconciles a freshly parsed build description against the state store:
//! the change-driven update that decides what the next execution must visit.

use std::collections::HashMap;

use crate::diff::{Change, sorted_diff, sorted_diff_by};
use crate::error::BuildError;
use crate::resource::Resource;
use crate::rules::Description;
use crate::scan::Scan;
use crate::state::{EdgeKind, ResourceId, StateTx, TaskId};
use crate::task::Task;

/// What one sync pass did to the store.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct SyncStats {
  pub description_changed: bool,
  pub resources_added: usize,
  pub resources_removed: usize,
  /// Surviving resources whose scan produced a different (status, checksum).
  pub resources_changed: usize,
  pub tasks_added: usize,
  pub tasks_removed: usize,
}

/// Brings the store into agreement with `description` inside the caller's
/// write transaction.
///
/// Vertices are diffed and inserted before edges; removal happens after edge
/// reconciliation so a vertex that still carries implicit edges survives.
/// Implicit edges themselves are never created or dropped here; observation is
/// the executor's business.
pub fn sync(tx: &StateTx, description: &Description, scanner: &dyn Scan) -> Result<SyncStats, BuildError> {
  let mut stats = SyncStats::default();

  let stored = tx.description()?;
  if stored.path != description.path || stored.checksum != description.fingerprint {
    tx.set_description(&description.path, &description.fingerprint)?;
    tx.add_pending_resource(ResourceId::DESCRIPTION)?;
    stats.description_changed = true;
  }

  let removed_resources = sync_resources(tx, description, &mut stats)?;
  let removed_tasks = sync_tasks(tx, description, &mut stats)?;
  sync_explicit_edges(tx, description)?;

  // Removal last: a vertex that lost all its rules but still has implicit
  // edges is kept; the cascade cleans up pending entries of the others.
  for id in removed_tasks {
    if tx.degree_in_task(id)? == 0 && tx.degree_out_task(id)? == 0 {
      tx.remove_task(id)?;
      stats.tasks_removed += 1;
    }
  }
  for id in removed_resources {
    if tx.degree_in_resource(id)? == 0 && tx.degree_out_resource(id)? == 0 {
      tx.remove_resource(id)?;
      stats.resources_removed += 1;
    }
  }

  // Re-scan every surviving resource; a changed observation makes it pending.
  for (id, mut resource) in tx.resources()? {
    let (status, checksum) = scanner.scan(&resource.path)?;
    if status != resource.status || checksum != resource.checksum {
      resource.status = status;
      resource.checksum = checksum;
      tx.update_resource(id, &resource)?;
      tx.add_pending_resource(id)?;
      stats.resources_changed += 1;
    }
  }

  tracing::debug!(?stats, "synced build description");
  Ok(stats)
}

/// Diffs declared resource paths against resources currently reachable from
/// the rules (those with at least one explicitly-originated edge). Returns the
/// ids that dropped out of the declared set.
fn sync_resources(
  tx: &StateTx,
  description: &Description,
  stats: &mut SyncStats,
) -> Result<Vec<ResourceId>, BuildError> {
  let mut declared: Vec<&str> = description.rules.iter()
    .flat_map(|rule| rule.inputs.iter().chain(rule.outputs.iter()))
    .map(String::as_str)
    .collect();
  declared.sort_unstable();
  declared.dedup();

  let stored = tx.explicit_resources()?;
  let ids: HashMap<&str, ResourceId> = stored.iter().map(|(id, path)| (path.as_str(), *id)).collect();
  let mut previous: Vec<&str> = stored.iter().map(|(_, path)| path.as_str()).collect();
  previous.sort_unstable();

  let mut removed = Vec::new();
  for change in sorted_diff(previous, declared) {
    match change {
      Change::Added(path) => {
        // The path may already be tracked through implicit edges alone; only
        // a genuinely new resource starts out pending.
        if tx.find_resource(path)?.is_none() {
          let id = tx.put_resource(&Resource::new(path))?;
          tx.add_pending_resource(id)?;
          stats.resources_added += 1;
        }
      }
      Change::Removed(path) => removed.push(ids[path]),
      Change::Unchanged(_) => {}
    }
  }
  Ok(removed)
}

/// Diffs declared tasks against all stored tasks by natural key. Returns the
/// ids that dropped out of the declared set.
fn sync_tasks(
  tx: &StateTx,
  description: &Description,
  stats: &mut SyncStats,
) -> Result<Vec<TaskId>, BuildError> {
  let mut declared: Vec<Task> = description.rules.iter().map(|rule| rule.task()).collect();
  declared.sort_unstable_by(|a, b| a.cmp_key(b));

  let mut stored = tx.tasks()?;
  stored.sort_unstable_by(|a, b| a.1.cmp_key(&b.1));

  let previous: Vec<(Option<TaskId>, Task)> = stored.into_iter().map(|(id, task)| (Some(id), task)).collect();
  let next: Vec<(Option<TaskId>, Task)> = declared.into_iter().map(|task| (None, task)).collect();

  let mut removed = Vec::new();
  for change in sorted_diff_by(previous, next, |a, b| a.1.cmp_key(&b.1)) {
    match change {
      Change::Added((_, task)) => {
        let id = tx.put_task(&task)?;
        tx.add_pending_task(id)?;
        stats.tasks_added += 1;
      }
      Change::Removed((id, _)) => {
        removed.push(id.expect("BUG: stored task has no id"));
      }
      Change::Unchanged((_, task)) => {
        // Identity is unchanged but the label may have been edited.
        if let Some(id) = tx.find_task(&task.commands, &task.working_dir)? {
          let mut current = tx.task(id)?;
          if current.display != task.display {
            current.display = task.display;
            tx.update_task(id, &current)?;
          }
        }
      }
    }
  }
  Ok(removed)
}

/// Diffs declared explicit edges against stored explicitly-originated edges.
/// Additions promote an existing implicit edge to both; removals demote both
/// to implicit and delete purely explicit rows.
fn sync_explicit_edges(tx: &StateTx, description: &Description) -> Result<(), BuildError> {
  let mut declared_rt: Vec<(ResourceId, TaskId)> = Vec::new();
  let mut declared_tr: Vec<(TaskId, ResourceId)> = Vec::new();
  for rule in &description.rules {
    let task = rule.task();
    let tid = tx.find_task(&task.commands, &task.working_dir)?
      .expect("BUG: declared task was not inserted");
    for input in &rule.inputs {
      let rid = tx.find_resource(input)?.expect("BUG: declared resource was not inserted");
      declared_rt.push((rid, tid));
    }
    for output in &rule.outputs {
      let rid = tx.find_resource(output)?.expect("BUG: declared resource was not inserted");
      declared_tr.push((tid, rid));
    }
  }
  declared_rt.sort_unstable();
  declared_rt.dedup();
  declared_tr.sort_unstable();
  declared_tr.dedup();

  for change in sorted_diff(tx.explicit_edges_rt()?, declared_rt) {
    match change {
      Change::Added((from, to)) => match tx.edge_rt(from, to)? {
        None => tx.put_edge_rt(from, to, EdgeKind::Explicit)?,
        Some(EdgeKind::Implicit) => tx.set_edge_kind_rt(from, to, EdgeKind::Both)?,
        Some(_) => {}
      },
      Change::Removed((from, to)) => match tx.edge_rt(from, to)? {
        Some(EdgeKind::Explicit) => tx.remove_edge_rt(from, to)?,
        Some(EdgeKind::Both) => tx.set_edge_kind_rt(from, to, EdgeKind::Implicit)?,
        _ => {}
      },
      Change::Unchanged(_) => {}
    }
  }
  for change in sorted_diff(tx.explicit_edges_tr()?, declared_tr) {
    match change {
      Change::Added((from, to)) => match tx.edge_tr(from, to)? {
        None => tx.put_edge_tr(from, to, EdgeKind::Explicit)?,
        Some(EdgeKind::Implicit) => tx.set_edge_kind_tr(from, to, EdgeKind::Both)?,
        Some(_) => {}
      },
      Change::Removed((from, to)) => match tx.edge_tr(from, to)? {
        Some(EdgeKind::Explicit) => tx.remove_edge_tr(from, to)?,
        Some(EdgeKind::Both) => tx.set_edge_kind_tr(from, to, EdgeKind::Implicit)?,
        _ => {}
      },
      Change::Unchanged(_) => {}
    }
  }
  Ok(())
}
