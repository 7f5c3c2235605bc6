//! The two pending sets. Membership operations are idempotent.

use rusqlite::{Connection, params};

use crate::error::StateError;

use super::{ResourceId, TaskId};

pub(super) fn add_pending_resource(conn: &Connection, id: ResourceId) -> Result<(), StateError> {
  conn.prepare_cached("INSERT OR IGNORE INTO pending_resource(id) VALUES (?1)")?
    .execute(params![id.0])?;
  Ok(())
}

pub(super) fn remove_pending_resource(conn: &Connection, id: ResourceId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM pending_resource WHERE id = ?1")?.execute(params![id.0])?;
  Ok(())
}

pub(super) fn is_pending_resource(conn: &Connection, id: ResourceId) -> Result<bool, StateError> {
  let count: i64 = conn.prepare_cached("SELECT COUNT(*) FROM pending_resource WHERE id = ?1")?
    .query_row(params![id.0], |row| row.get(0))?;
  Ok(count > 0)
}

pub(super) fn pending_resources(conn: &Connection) -> Result<Vec<ResourceId>, StateError> {
  let mut stmt = conn.prepare_cached("SELECT id FROM pending_resource ORDER BY id")?;
  let rows = stmt.query_map([], |row| Ok(ResourceId(row.get(0)?)))?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn add_pending_task(conn: &Connection, id: TaskId) -> Result<(), StateError> {
  conn.prepare_cached("INSERT OR IGNORE INTO pending_task(id) VALUES (?1)")?
    .execute(params![id.0])?;
  Ok(())
}

pub(super) fn remove_pending_task(conn: &Connection, id: TaskId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM pending_task WHERE id = ?1")?.execute(params![id.0])?;
  Ok(())
}

pub(super) fn is_pending_task(conn: &Connection, id: TaskId) -> Result<bool, StateError> {
  let count: i64 = conn.prepare_cached("SELECT COUNT(*) FROM pending_task WHERE id = ?1")?
    .query_row(params![id.0], |row| row.get(0))?;
  Ok(count > 0)
}

pub(super) fn pending_tasks(conn: &Connection) -> Result<Vec<TaskId>, StateError> {
  let mut stmt = conn.prepare_cached("SELECT id FROM pending_task ORDER BY id")?;
  let rows = stmt.query_map([], |row| Ok(TaskId(row.get(0)?)))?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}
