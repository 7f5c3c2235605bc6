//! Row operations for the two edge tables and the degree queries derived from
//! them. There is at most one edge row per (from, to) pair; its kind records
//! whether the dependency is declared, observed, or both.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StateError;

use super::{EdgeKind, ResourceId, TaskId};

pub(super) fn put_edge_rt(conn: &Connection, from: ResourceId, to: TaskId, kind: EdgeKind) -> Result<(), StateError> {
  conn.prepare_cached("INSERT INTO resource_edge(from_id, to_id, kind) VALUES (?1, ?2, ?3)")?
    .execute(params![from.0, to.0, kind.to_i64()])
    .map_err(|e| edge_error(e, from.0, to.0))?;
  Ok(())
}

pub(super) fn put_edge_tr(conn: &Connection, from: TaskId, to: ResourceId, kind: EdgeKind) -> Result<(), StateError> {
  conn.prepare_cached("INSERT INTO task_edge(from_id, to_id, kind) VALUES (?1, ?2, ?3)")?
    .execute(params![from.0, to.0, kind.to_i64()])
    .map_err(|e| edge_error(e, from.0, to.0))?;
  Ok(())
}

pub(super) fn set_edge_kind_rt(conn: &Connection, from: ResourceId, to: TaskId, kind: EdgeKind) -> Result<(), StateError> {
  conn.prepare_cached("UPDATE resource_edge SET kind = ?3 WHERE from_id = ?1 AND to_id = ?2")?
    .execute(params![from.0, to.0, kind.to_i64()])?;
  Ok(())
}

pub(super) fn set_edge_kind_tr(conn: &Connection, from: TaskId, to: ResourceId, kind: EdgeKind) -> Result<(), StateError> {
  conn.prepare_cached("UPDATE task_edge SET kind = ?3 WHERE from_id = ?1 AND to_id = ?2")?
    .execute(params![from.0, to.0, kind.to_i64()])?;
  Ok(())
}

pub(super) fn remove_edge_rt(conn: &Connection, from: ResourceId, to: TaskId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM resource_edge WHERE from_id = ?1 AND to_id = ?2")?
    .execute(params![from.0, to.0])?;
  Ok(())
}

pub(super) fn remove_edge_tr(conn: &Connection, from: TaskId, to: ResourceId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM task_edge WHERE from_id = ?1 AND to_id = ?2")?
    .execute(params![from.0, to.0])?;
  Ok(())
}

pub(super) fn edge_rt(conn: &Connection, from: ResourceId, to: TaskId) -> Result<Option<EdgeKind>, StateError> {
  let kind = conn.prepare_cached("SELECT kind FROM resource_edge WHERE from_id = ?1 AND to_id = ?2")?
    .query_row(params![from.0, to.0], |row| row.get::<_, i64>(0))
    .optional()?;
  Ok(kind.map(EdgeKind::from_i64))
}

pub(super) fn edge_tr(conn: &Connection, from: TaskId, to: ResourceId) -> Result<Option<EdgeKind>, StateError> {
  let kind = conn.prepare_cached("SELECT kind FROM task_edge WHERE from_id = ?1 AND to_id = ?2")?
    .query_row(params![from.0, to.0], |row| row.get::<_, i64>(0))
    .optional()?;
  Ok(kind.map(EdgeKind::from_i64))
}

pub(super) fn outgoing_of_resource(conn: &Connection, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT to_id, kind FROM resource_edge WHERE from_id = ?1 ORDER BY id",
  )?;
  let rows = stmt.query_map(params![id.0], |row| {
    Ok((TaskId(row.get(0)?), EdgeKind::from_i64(row.get(1)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn incoming_of_resource(conn: &Connection, id: ResourceId) -> Result<Vec<(TaskId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT from_id, kind FROM task_edge WHERE to_id = ?1 ORDER BY id",
  )?;
  let rows = stmt.query_map(params![id.0], |row| {
    Ok((TaskId(row.get(0)?), EdgeKind::from_i64(row.get(1)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn outgoing_of_task(conn: &Connection, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT to_id, kind FROM task_edge WHERE from_id = ?1 ORDER BY id",
  )?;
  let rows = stmt.query_map(params![id.0], |row| {
    Ok((ResourceId(row.get(0)?), EdgeKind::from_i64(row.get(1)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn incoming_of_task(conn: &Connection, id: TaskId) -> Result<Vec<(ResourceId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT from_id, kind FROM resource_edge WHERE to_id = ?1 ORDER BY id",
  )?;
  let rows = stmt.query_map(params![id.0], |row| {
    Ok((ResourceId(row.get(0)?), EdgeKind::from_i64(row.get(1)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn edges_rt(conn: &Connection) -> Result<Vec<(ResourceId, TaskId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached("SELECT from_id, to_id, kind FROM resource_edge ORDER BY id")?;
  let rows = stmt.query_map([], |row| {
    Ok((ResourceId(row.get(0)?), TaskId(row.get(1)?), EdgeKind::from_i64(row.get(2)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn edges_tr(conn: &Connection) -> Result<Vec<(TaskId, ResourceId, EdgeKind)>, StateError> {
  let mut stmt = conn.prepare_cached("SELECT from_id, to_id, kind FROM task_edge ORDER BY id")?;
  let rows = stmt.query_map([], |row| {
    Ok((TaskId(row.get(0)?), ResourceId(row.get(1)?), EdgeKind::from_i64(row.get(2)?)))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn degree_in_resource(conn: &Connection, id: ResourceId) -> Result<usize, StateError> {
  count(conn, "SELECT COUNT(*) FROM task_edge WHERE to_id = ?1", id.0)
}

pub(super) fn degree_out_resource(conn: &Connection, id: ResourceId) -> Result<usize, StateError> {
  count(conn, "SELECT COUNT(*) FROM resource_edge WHERE from_id = ?1", id.0)
}

pub(super) fn degree_in_task(conn: &Connection, id: TaskId) -> Result<usize, StateError> {
  count(conn, "SELECT COUNT(*) FROM resource_edge WHERE to_id = ?1", id.0)
}

pub(super) fn degree_out_task(conn: &Connection, id: TaskId) -> Result<usize, StateError> {
  count(conn, "SELECT COUNT(*) FROM task_edge WHERE from_id = ?1", id.0)
}

/// Vertices with no incident edges at all, the description excluded.
pub(super) fn islands(conn: &Connection) -> Result<(Vec<ResourceId>, Vec<TaskId>), StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT id FROM resource WHERE id > 1 \
     AND NOT EXISTS (SELECT 1 FROM resource_edge WHERE from_id = resource.id) \
     AND NOT EXISTS (SELECT 1 FROM task_edge WHERE to_id = resource.id) \
     ORDER BY id",
  )?;
  let resources = stmt.query_map([], |row| Ok(ResourceId(row.get(0)?)))?
    .collect::<Result<Vec<_>, _>>()?;

  let mut stmt = conn.prepare_cached(
    "SELECT id FROM task \
     WHERE NOT EXISTS (SELECT 1 FROM resource_edge WHERE to_id = task.id) \
     AND NOT EXISTS (SELECT 1 FROM task_edge WHERE from_id = task.id) \
     ORDER BY id",
  )?;
  let tasks = stmt.query_map([], |row| Ok(TaskId(row.get(0)?)))?
    .collect::<Result<Vec<_>, _>>()?;

  Ok((resources, tasks))
}

/// Resources participating in at least one edge with a declared origin
/// (kind explicit or both), in insertion order. These are the resources the
/// current rule set reaches; the syncer diffs declared rules against them.
pub(super) fn explicit_resources(conn: &Connection) -> Result<Vec<(ResourceId, String)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT r.id, r.path FROM resource r WHERE r.id > 1 \
     AND (EXISTS (SELECT 1 FROM resource_edge e WHERE e.from_id = r.id AND e.kind IN (0, 2)) \
       OR EXISTS (SELECT 1 FROM task_edge e WHERE e.to_id = r.id AND e.kind IN (0, 2))) \
     ORDER BY r.id",
  )?;
  let rows = stmt.query_map([], |row| Ok((ResourceId(row.get(0)?), row.get::<_, String>(1)?)))?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Resource→task edges with a declared origin, ordered by (from, to).
pub(super) fn explicit_edges_rt(conn: &Connection) -> Result<Vec<(ResourceId, TaskId)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT from_id, to_id FROM resource_edge WHERE kind IN (0, 2) ORDER BY from_id, to_id",
  )?;
  let rows = stmt.query_map([], |row| Ok((ResourceId(row.get(0)?), TaskId(row.get(1)?))))?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Task→resource edges with a declared origin, ordered by (from, to).
pub(super) fn explicit_edges_tr(conn: &Connection) -> Result<Vec<(TaskId, ResourceId)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT from_id, to_id FROM task_edge WHERE kind IN (0, 2) ORDER BY from_id, to_id",
  )?;
  let rows = stmt.query_map([], |row| Ok((TaskId(row.get(0)?), ResourceId(row.get(1)?))))?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn count(conn: &Connection, sql: &str, id: i64) -> Result<usize, StateError> {
  let count: i64 = conn.prepare_cached(sql)?.query_row(params![id], |row| row.get(0))?;
  Ok(count as usize)
}

fn edge_error(e: rusqlite::Error, from: i64, to: i64) -> StateError {
  match e {
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY =>
    {
      StateError::InvalidEdge { from, to }
    }
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
    {
      StateError::AlreadyExists { entity: "edge", key: format!("{from} -> {to}") }
    }
    e => StateError::Sql(e),
  }
}
