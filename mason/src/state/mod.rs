//! The persistent state store: a single-file sqlite database remembering
//! vertices, edges, pending sets, and content fingerprints between runs.
//!
//! All mutation goes through [`StateTx`], obtained from
//! [`StateStore::transaction`]; dropping the guard without committing rolls
//! back, so a failure never leaves the store half-written. Reads are available
//! on both the store and the guard. Every statement is prepared once per
//! connection and reused through rusqlite's statement cache.

mod edge;
mod pending;
mod schema;
mod vertex;

use std::path::Path;

use rusqlite::{Connection, Transaction};

use crate::error::StateError;
use crate::resource::Resource;
use crate::task::Task;

/// Identifier of a resource vertex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ResourceId(i64);

impl ResourceId {
  /// The reserved, always-present resource whose checksum fingerprints the
  /// build description. All other resources have larger ids.
  pub const DESCRIPTION: ResourceId = ResourceId(1);

  #[inline]
  pub fn raw(self) -> i64 { self.0 }
}

/// Identifier of a task vertex.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TaskId(i64);

impl TaskId {
  #[inline]
  pub fn raw(self) -> i64 { self.0 }
}

/// Origin of a dependency edge. A single edge row exists per (from, to) pair;
/// an edge that is both declared by a rule and observed during execution is
/// stored as `Both`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EdgeKind {
  Explicit,
  Implicit,
  Both,
}

impl EdgeKind {
  /// True when the edge has a declared origin.
  #[inline]
  pub fn is_explicit(self) -> bool { matches!(self, EdgeKind::Explicit | EdgeKind::Both) }
  /// True when the edge has an observed origin.
  #[inline]
  pub fn is_implicit(self) -> bool { matches!(self, EdgeKind::Implicit | EdgeKind::Both) }

  fn to_i64(self) -> i64 {
    match self {
      EdgeKind::Explicit => 0,
      EdgeKind::Implicit => 1,
      EdgeKind::Both => 2,
    }
  }

  fn from_i64(value: i64) -> Self {
    match value {
      1 => EdgeKind::Implicit,
      2 => EdgeKind::Both,
      _ => EdgeKind::Explicit,
    }
  }
}

/// Unix milliseconds, the store's timestamp unit.
pub(crate) fn now_ms() -> i64 {
  use std::time::{SystemTime, UNIX_EPOCH};
  SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Handle to one state file. Owned by the main thread; workers never touch it.
#[derive(Debug)]
pub struct StateStore {
  conn: Connection,
}

impl StateStore {
  /// Opens (creating if necessary) the state file at `path`.
  pub fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
    Self::init(Connection::open(path)?)
  }

  /// Opens a store that lives only in memory, mainly for tests.
  pub fn open_in_memory() -> Result<Self, StateError> {
    Self::init(Connection::open_in_memory()?)
  }

  fn init(conn: Connection) -> Result<Self, StateError> {
    conn.pragma_update(None, "foreign_keys", true)?;
    schema::init(&conn)?;
    Ok(Self { conn })
  }

  /// Begins a write transaction. Mutations are only available on the returned
  /// guard; dropping it without [`StateTx::commit`] rolls everything back.
  pub fn transaction(&mut self) -> Result<StateTx<'_>, StateError> {
    Ok(StateTx { tx: self.conn.transaction()? })
  }

  pub fn find_resource(&self, path: &str) -> Result<Option<ResourceId>, StateError> {
    vertex::find_resource(&self.conn, path)
  }
  pub fn resource(&self, id: ResourceId) -> Result<Resource, StateError> {
    vertex::resource(&self.conn, id)
  }
  pub fn resources(&self) -> Result<Vec<(ResourceId, Resource)>, StateError> {
    vertex::resources(&self.conn)
  }
  pub fn description(&self) -> Result<Resource, StateError> {
    vertex::description(&self.conn)
  }
  pub fn find_task(&self, commands: &[Vec<String>], working_dir: &str) -> Result<Option<TaskId>, StateError> {
    vertex::find_task(&self.conn, commands, working_dir)
  }
  pub fn task(&self, id: TaskId) -> Result<Task, StateError> {
    vertex::task(&self.conn, id)
  }
  pub fn tasks(&self) -> Result<Vec<(TaskId, Task)>, StateError> {
    vertex::tasks(&self.conn)
  }

  pub fn edge_rt(&self, from: ResourceId, to: TaskId) -> Result<Option<EdgeKind>, StateError> {
    edge::edge_rt(&self.conn, from, to)
  }
  pub fn edge_tr(&self, from: TaskId, to: ResourceId) -> Result<Option<EdgeKind>, StateError> {
    edge::edge_tr(&self.conn, from, to)
  }
  pub fn edges_rt(&self) -> Result<Vec<(ResourceId, TaskId, EdgeKind)>, StateError> {
    edge::edges_rt(&self.conn)
  }
  pub fn edges_tr(&self) -> Result<Vec<(TaskId, ResourceId, EdgeKind)>, StateError> {
    edge::edges_tr(&self.conn)
  }
  pub fn outgoing_of_resource(&self, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
    edge::outgoing_of_resource(&self.conn, id)
  }
  pub fn incoming_of_resource(&self, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
    edge::incoming_of_resource(&self.conn, id)
  }
  pub fn outgoing_of_task(&self, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
    edge::outgoing_of_task(&self.conn, id)
  }
  pub fn incoming_of_task(&self, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
    edge::incoming_of_task(&self.conn, id)
  }
  pub fn degree_in_resource(&self, id: ResourceId) -> Result<usize, StateError> {
    edge::degree_in_resource(&self.conn, id)
  }
  pub fn degree_out_resource(&self, id: ResourceId) -> Result<usize, StateError> {
    edge::degree_out_resource(&self.conn, id)
  }
  pub fn degree_in_task(&self, id: TaskId) -> Result<usize, StateError> {
    edge::degree_in_task(&self.conn, id)
  }
  pub fn degree_out_task(&self, id: TaskId) -> Result<usize, StateError> {
    edge::degree_out_task(&self.conn, id)
  }
  pub fn islands(&self) -> Result<(Vec<ResourceId>, Vec<TaskId>), StateError> {
    edge::islands(&self.conn)
  }

  pub fn is_pending_resource(&self, id: ResourceId) -> Result<bool, StateError> {
    pending::is_pending_resource(&self.conn, id)
  }
  pub fn pending_resources(&self) -> Result<Vec<ResourceId>, StateError> {
    pending::pending_resources(&self.conn)
  }
  pub fn is_pending_task(&self, id: TaskId) -> Result<bool, StateError> {
    pending::is_pending_task(&self.conn, id)
  }
  pub fn pending_tasks(&self) -> Result<Vec<TaskId>, StateError> {
    pending::pending_tasks(&self.conn)
  }
}

/// Write transaction over a [`StateStore`]. Exposes the full operation
/// surface; commits explicitly, rolls back on drop.
#[derive(Debug)]
pub struct StateTx<'c> {
  tx: Transaction<'c>,
}

impl StateTx<'_> {
  pub fn commit(self) -> Result<(), StateError> {
    self.tx.commit()?;
    Ok(())
  }

  pub fn rollback(self) -> Result<(), StateError> {
    self.tx.rollback()?;
    Ok(())
  }

  /// Inserts a new resource; fails if its path is already taken.
  pub fn put_resource(&self, resource: &Resource) -> Result<ResourceId, StateError> {
    vertex::put_resource(&self.tx, resource)
  }
  /// Inserts a resource or returns the id of the existing one with that path.
  pub fn add_resource(&self, resource: &Resource) -> Result<ResourceId, StateError> {
    vertex::add_resource(&self.tx, resource)
  }
  /// Overwrites the stored value of `id`; a nonexistent id is silently ok.
  pub fn update_resource(&self, id: ResourceId, resource: &Resource) -> Result<(), StateError> {
    vertex::update_resource(&self.tx, id, resource)
  }
  /// Removes a resource; incident edges and pending entries cascade away.
  /// A nonexistent id is silently ok.
  pub fn remove_resource(&self, id: ResourceId) -> Result<(), StateError> {
    vertex::remove_resource(&self.tx, id)
  }
  pub fn remove_resource_by_path(&self, path: &str) -> Result<(), StateError> {
    vertex::remove_resource_by_path(&self.tx, path)
  }
  /// Points the description row at `path` and records the description
  /// fingerprint as its checksum.
  pub fn set_description(&self, path: &str, checksum: &[u8]) -> Result<(), StateError> {
    vertex::set_description(&self.tx, path, checksum)
  }

  pub fn put_task(&self, task: &Task) -> Result<TaskId, StateError> {
    vertex::put_task(&self.tx, task)
  }
  pub fn add_task(&self, task: &Task) -> Result<TaskId, StateError> {
    vertex::add_task(&self.tx, task)
  }
  pub fn update_task(&self, id: TaskId, task: &Task) -> Result<(), StateError> {
    vertex::update_task(&self.tx, id, task)
  }
  pub fn remove_task(&self, id: TaskId) -> Result<(), StateError> {
    vertex::remove_task(&self.tx, id)
  }
  pub fn remove_task_by_key(&self, commands: &[Vec<String>], working_dir: &str) -> Result<(), StateError> {
    vertex::remove_task_by_key(&self.tx, commands, working_dir)
  }

  /// Inserts a resource→task edge; fails on a duplicate pair or a missing
  /// endpoint.
  pub fn put_edge_rt(&self, from: ResourceId, to: TaskId, kind: EdgeKind) -> Result<(), StateError> {
    edge::put_edge_rt(&self.tx, from, to, kind)
  }
  pub fn put_edge_tr(&self, from: TaskId, to: ResourceId, kind: EdgeKind) -> Result<(), StateError> {
    edge::put_edge_tr(&self.tx, from, to, kind)
  }
  /// Changes the kind of an existing edge (promotion/demotion); a nonexistent
  /// edge is silently ok.
  pub fn set_edge_kind_rt(&self, from: ResourceId, to: TaskId, kind: EdgeKind) -> Result<(), StateError> {
    edge::set_edge_kind_rt(&self.tx, from, to, kind)
  }
  pub fn set_edge_kind_tr(&self, from: TaskId, to: ResourceId, kind: EdgeKind) -> Result<(), StateError> {
    edge::set_edge_kind_tr(&self.tx, from, to, kind)
  }
  pub fn remove_edge_rt(&self, from: ResourceId, to: TaskId) -> Result<(), StateError> {
    edge::remove_edge_rt(&self.tx, from, to)
  }
  pub fn remove_edge_tr(&self, from: TaskId, to: ResourceId) -> Result<(), StateError> {
    edge::remove_edge_tr(&self.tx, from, to)
  }

  pub fn add_pending_resource(&self, id: ResourceId) -> Result<(), StateError> {
    pending::add_pending_resource(&self.tx, id)
  }
  pub fn remove_pending_resource(&self, id: ResourceId) -> Result<(), StateError> {
    pending::remove_pending_resource(&self.tx, id)
  }
  pub fn add_pending_task(&self, id: TaskId) -> Result<(), StateError> {
    pending::add_pending_task(&self.tx, id)
  }
  pub fn remove_pending_task(&self, id: TaskId) -> Result<(), StateError> {
    pending::remove_pending_task(&self.tx, id)
  }

  pub fn find_resource(&self, path: &str) -> Result<Option<ResourceId>, StateError> {
    vertex::find_resource(&self.tx, path)
  }
  pub fn resource(&self, id: ResourceId) -> Result<Resource, StateError> {
    vertex::resource(&self.tx, id)
  }
  pub fn resources(&self) -> Result<Vec<(ResourceId, Resource)>, StateError> {
    vertex::resources(&self.tx)
  }
  pub fn description(&self) -> Result<Resource, StateError> {
    vertex::description(&self.tx)
  }
  pub fn find_task(&self, commands: &[Vec<String>], working_dir: &str) -> Result<Option<TaskId>, StateError> {
    vertex::find_task(&self.tx, commands, working_dir)
  }
  pub fn task(&self, id: TaskId) -> Result<Task, StateError> {
    vertex::task(&self.tx, id)
  }
  pub fn tasks(&self) -> Result<Vec<(TaskId, Task)>, StateError> {
    vertex::tasks(&self.tx)
  }
  pub fn edge_rt(&self, from: ResourceId, to: TaskId) -> Result<Option<EdgeKind>, StateError> {
    edge::edge_rt(&self.tx, from, to)
  }
  pub fn edge_tr(&self, from: TaskId, to: ResourceId) -> Result<Option<EdgeKind>, StateError> {
    edge::edge_tr(&self.tx, from, to)
  }
  pub fn outgoing_of_resource(&self, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
    edge::outgoing_of_resource(&self.tx, id)
  }
  pub fn incoming_of_resource(&self, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
    edge::incoming_of_resource(&self.tx, id)
  }
  pub fn outgoing_of_task(&self, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
    edge::outgoing_of_task(&self.tx, id)
  }
  pub fn incoming_of_task(&self, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
    edge::incoming_of_task(&self.tx, id)
  }
  pub fn degree_in_resource(&self, id: ResourceId) -> Result<usize, StateError> {
    edge::degree_in_resource(&self.tx, id)
  }
  pub fn degree_out_resource(&self, id: ResourceId) -> Result<usize, StateError> {
    edge::degree_out_resource(&self.tx, id)
  }
  pub fn degree_in_task(&self, id: TaskId) -> Result<usize, StateError> {
    edge::degree_in_task(&self.tx, id)
  }
  pub fn degree_out_task(&self, id: TaskId) -> Result<usize, StateError> {
    edge::degree_out_task(&self.tx, id)
  }
  pub fn islands(&self) -> Result<(Vec<ResourceId>, Vec<TaskId>), StateError> {
    edge::islands(&self.tx)
  }
  pub(crate) fn explicit_resources(&self) -> Result<Vec<(ResourceId, String)>, StateError> {
    edge::explicit_resources(&self.tx)
  }
  pub(crate) fn explicit_edges_rt(&self) -> Result<Vec<(ResourceId, TaskId)>, StateError> {
    edge::explicit_edges_rt(&self.tx)
  }
  pub(crate) fn explicit_edges_tr(&self) -> Result<Vec<(TaskId, ResourceId)>, StateError> {
    edge::explicit_edges_tr(&self.tx)
  }
  pub fn is_pending_resource(&self, id: ResourceId) -> Result<bool, StateError> {
    pending::is_pending_resource(&self.tx, id)
  }
  pub fn pending_resources(&self) -> Result<Vec<ResourceId>, StateError> {
    pending::pending_resources(&self.tx)
  }
  pub fn is_pending_task(&self, id: TaskId) -> Result<bool, StateError> {
    pending::is_pending_task(&self.tx, id)
  }
  pub fn pending_tasks(&self) -> Result<Vec<TaskId>, StateError> {
    pending::pending_tasks(&self.tx)
  }
}

#[cfg(test)]
mod test {
  use assert_matches::assert_matches;

  use crate::resource::ResourceStatus;

  use super::*;

  fn store() -> StateStore {
    StateStore::open_in_memory().expect("failed to open in-memory store")
  }

  fn resource(path: &str) -> Resource {
    Resource::new(path)
  }

  fn task(name: &str) -> Task {
    Task::new(vec![vec!["run".to_string(), name.to_string()]], "/wd")
  }

  #[test]
  fn fresh_store_reserves_the_description_row() {
    let store = store();
    let description = store.description().unwrap();
    assert_eq!(description.path, "");
    assert!(description.checksum.is_empty());
    assert!(store.resources().unwrap().is_empty());
    assert!(store.tasks().unwrap().is_empty());
  }

  #[test]
  fn put_then_lookup_round_trips() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let mut wanted = resource("/p/foo.c");
    wanted.status = ResourceStatus::File;
    wanted.checksum = vec![1, 2, 3];
    let rid = tx.put_resource(&wanted).unwrap();

    let mut wanted_task = task("a").with_display("compile");
    wanted_task.last_executed = 99;
    let tid = tx.put_task(&wanted_task).unwrap();
    tx.commit().unwrap();

    assert_eq!(store.resource(rid).unwrap(), wanted);
    assert_eq!(store.task(tid).unwrap(), wanted_task);
  }

  #[test]
  fn put_duplicate_key_fails() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    tx.put_resource(&resource("/a")).unwrap();
    assert_matches!(tx.put_resource(&resource("/a")), Err(StateError::AlreadyExists { .. }));
    tx.put_task(&task("a")).unwrap();
    assert_matches!(tx.put_task(&task("a")), Err(StateError::AlreadyExists { .. }));
  }

  #[test]
  fn add_returns_the_existing_id() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let first = tx.put_resource(&resource("/a")).unwrap();
    assert_eq!(tx.add_resource(&resource("/a")).unwrap(), first);
    let first = tx.put_task(&task("a")).unwrap();
    assert_eq!(tx.add_task(&task("a")).unwrap(), first);
  }

  #[test]
  fn find_by_natural_key() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let rid = tx.put_resource(&resource("/a")).unwrap();
    let tid = tx.put_task(&task("a")).unwrap();
    tx.commit().unwrap();

    assert_eq!(store.find_resource("/a").unwrap(), Some(rid));
    assert_eq!(store.find_resource("/missing").unwrap(), None);
    let t = task("a");
    assert_eq!(store.find_task(&t.commands, &t.working_dir).unwrap(), Some(tid));
    assert_eq!(store.find_task(&t.commands, "/elsewhere").unwrap(), None);
  }

  #[test]
  fn remove_by_natural_key_is_silent_when_missing() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let t = task("a");
    tx.put_task(&t).unwrap();
    tx.remove_task_by_key(&t.commands, &t.working_dir).unwrap();
    assert_eq!(tx.find_task(&t.commands, &t.working_dir).unwrap(), None);
    tx.remove_task_by_key(&t.commands, &t.working_dir).unwrap();

    tx.put_resource(&resource("/a")).unwrap();
    tx.remove_resource_by_path("/a").unwrap();
    assert_eq!(tx.find_resource("/a").unwrap(), None);
    tx.remove_resource_by_path("/missing").unwrap();
  }

  #[test]
  fn lookup_of_nonexistent_id_errors() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let rid = tx.put_resource(&resource("/a")).unwrap();
    tx.remove_resource(rid).unwrap();
    assert_matches!(tx.resource(rid), Err(StateError::NotFound { entity: "resource", .. }));
  }

  #[test]
  fn update_overwrites_and_is_silent_on_missing() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let rid = tx.put_resource(&resource("/a")).unwrap();
    let mut changed = resource("/a");
    changed.status = ResourceStatus::Missing;
    tx.update_resource(rid, &changed).unwrap();
    assert_eq!(tx.resource(rid).unwrap().status, ResourceStatus::Missing);

    tx.remove_resource(rid).unwrap();
    tx.update_resource(rid, &changed).unwrap();

    let tid = tx.put_task(&task("a")).unwrap();
    let mut executed = task("a");
    executed.last_executed = 7;
    tx.update_task(tid, &executed).unwrap();
    assert_eq!(tx.task(tid).unwrap().last_executed, 7);
  }

  #[test]
  fn removing_a_vertex_cascades_to_edges_and_pending() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let r = tx.put_resource(&resource("/a")).unwrap();
    let o = tx.put_resource(&resource("/b")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    tx.put_edge_rt(r, t, EdgeKind::Explicit).unwrap();
    tx.put_edge_tr(t, o, EdgeKind::Explicit).unwrap();
    tx.add_pending_resource(r).unwrap();
    tx.add_pending_task(t).unwrap();

    tx.remove_resource(r).unwrap();
    assert_eq!(tx.degree_in_task(t).unwrap(), 0);
    assert!(!tx.is_pending_resource(r).unwrap());
    assert!(tx.edge_rt(r, t).unwrap().is_none());

    tx.remove_task(t).unwrap();
    assert!(tx.edge_tr(t, o).unwrap().is_none());
    assert!(!tx.is_pending_task(t).unwrap());
    assert_eq!(tx.degree_in_resource(o).unwrap(), 0);
  }

  #[test]
  fn degrees_count_incident_edges() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let a = tx.put_resource(&resource("/a")).unwrap();
    let b = tx.put_resource(&resource("/b")).unwrap();
    let out = tx.put_resource(&resource("/out")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    tx.put_edge_rt(a, t, EdgeKind::Explicit).unwrap();
    tx.put_edge_rt(b, t, EdgeKind::Implicit).unwrap();
    tx.put_edge_tr(t, out, EdgeKind::Explicit).unwrap();

    assert_eq!(tx.degree_in_task(t).unwrap(), 2);
    assert_eq!(tx.degree_out_task(t).unwrap(), 1);
    assert_eq!(tx.degree_out_resource(a).unwrap(), 1);
    assert_eq!(tx.degree_in_resource(out).unwrap(), 1);
    assert_eq!(tx.degree_in_resource(a).unwrap(), 0);
  }

  #[test]
  fn enumeration_skips_the_description_and_keeps_insertion_order() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    tx.put_resource(&resource("/z")).unwrap();
    tx.put_resource(&resource("/a")).unwrap();
    tx.put_resource(&resource("/m")).unwrap();
    tx.commit().unwrap();

    let paths: Vec<_> = store.resources().unwrap().into_iter().map(|(_, r)| r.path).collect();
    assert_eq!(paths, vec!["/z", "/a", "/m"]);
    assert!(store.resources().unwrap().iter().all(|(id, _)| id.raw() > 1));
  }

  #[test]
  fn ids_are_not_reused_after_removal() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let first = tx.put_resource(&resource("/a")).unwrap();
    tx.remove_resource(first).unwrap();
    let second = tx.put_resource(&resource("/a")).unwrap();
    assert!(second > first);

    let first = tx.put_task(&task("a")).unwrap();
    tx.remove_task(first).unwrap();
    let second = tx.put_task(&task("a")).unwrap();
    assert!(second > first);
  }

  #[test]
  fn duplicate_edge_fails_and_kind_can_change() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let r = tx.put_resource(&resource("/a")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    tx.put_edge_rt(r, t, EdgeKind::Implicit).unwrap();
    assert_matches!(
      tx.put_edge_rt(r, t, EdgeKind::Explicit),
      Err(StateError::AlreadyExists { entity: "edge", .. })
    );

    tx.set_edge_kind_rt(r, t, EdgeKind::Both).unwrap();
    assert_eq!(tx.edge_rt(r, t).unwrap(), Some(EdgeKind::Both));

    tx.remove_edge_rt(r, t).unwrap();
    assert!(tx.edge_rt(r, t).unwrap().is_none());
    // Removing again is silently ok.
    tx.remove_edge_rt(r, t).unwrap();
  }

  #[test]
  fn edge_to_nonexistent_vertex_is_invalid() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let r = tx.put_resource(&resource("/a")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    tx.remove_task(t).unwrap();
    assert_matches!(tx.put_edge_rt(r, t, EdgeKind::Explicit), Err(StateError::InvalidEdge { .. }));
  }

  #[test]
  fn neighbor_iteration_pairs_ids_with_kinds() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let a = tx.put_resource(&resource("/a")).unwrap();
    let b = tx.put_resource(&resource("/b")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    tx.put_edge_rt(a, t, EdgeKind::Explicit).unwrap();
    tx.put_edge_rt(b, t, EdgeKind::Implicit).unwrap();
    tx.put_edge_tr(t, a, EdgeKind::Both).unwrap();
    tx.commit().unwrap();

    assert_eq!(store.incoming_of_task(t).unwrap(), vec![
      (a, EdgeKind::Explicit),
      (b, EdgeKind::Implicit),
    ]);
    assert_eq!(store.outgoing_of_task(t).unwrap(), vec![(a, EdgeKind::Both)]);
    assert_eq!(store.outgoing_of_resource(a).unwrap(), vec![(t, EdgeKind::Explicit)]);
    assert_eq!(store.incoming_of_resource(a).unwrap(), vec![(t, EdgeKind::Both)]);
  }

  #[test]
  fn pending_membership_is_idempotent() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let r = tx.put_resource(&resource("/a")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();

    tx.add_pending_resource(r).unwrap();
    tx.add_pending_resource(r).unwrap();
    tx.add_pending_task(t).unwrap();
    tx.add_pending_task(t).unwrap();
    assert_eq!(tx.pending_resources().unwrap(), vec![r]);
    assert_eq!(tx.pending_tasks().unwrap(), vec![t]);
    assert!(tx.is_pending_resource(r).unwrap());
    assert!(tx.is_pending_task(t).unwrap());

    tx.remove_pending_resource(r).unwrap();
    tx.remove_pending_resource(r).unwrap();
    tx.remove_pending_task(t).unwrap();
    assert!(tx.pending_resources().unwrap().is_empty());
    assert!(tx.pending_tasks().unwrap().is_empty());
  }

  #[test]
  fn islands_are_vertices_with_no_incident_edges() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    let a = tx.put_resource(&resource("/a")).unwrap();
    let lone = tx.put_resource(&resource("/lone")).unwrap();
    let t = tx.put_task(&task("a")).unwrap();
    let lone_task = tx.put_task(&task("lone")).unwrap();
    tx.put_edge_rt(a, t, EdgeKind::Explicit).unwrap();
    tx.commit().unwrap();

    let (resources, tasks) = store.islands().unwrap();
    assert_eq!(resources, vec![lone]);
    assert_eq!(tasks, vec![lone_task]);
  }

  #[test]
  fn dropping_a_transaction_rolls_back() {
    let mut store = store();
    {
      let tx = store.transaction().unwrap();
      tx.put_resource(&resource("/a")).unwrap();
      // No commit.
    }
    assert_eq!(store.find_resource("/a").unwrap(), None);
  }

  #[test]
  fn set_description_updates_the_reserved_row() {
    let mut store = store();
    let tx = store.transaction().unwrap();
    tx.set_description("BUILD", &[7, 7, 7]).unwrap();
    tx.commit().unwrap();

    let description = store.description().unwrap();
    assert_eq!(description.path, "BUILD");
    assert_eq!(description.checksum, vec![7, 7, 7]);
    // The description never shows up in enumeration.
    assert!(store.resources().unwrap().is_empty());
  }
}
