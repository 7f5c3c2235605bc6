//! Row operations for the two vertex tables. All functions take a borrowed
//! connection so they work both in autocommit mode and inside a transaction.

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StateError;
use crate::resource::{Resource, ResourceStatus};
use crate::task::Task;

use super::{ResourceId, TaskId};

pub(super) fn put_resource(conn: &Connection, resource: &Resource) -> Result<ResourceId, StateError> {
  conn.prepare_cached("INSERT INTO resource(path, status, checksum) VALUES (?1, ?2, ?3)")?
    .execute(params![resource.path, resource.status.to_i64(), resource.checksum])
    .map_err(|e| key_conflict(e, "resource", &resource.path))?;
  Ok(ResourceId(conn.last_insert_rowid()))
}

pub(super) fn add_resource(conn: &Connection, resource: &Resource) -> Result<ResourceId, StateError> {
  match find_resource(conn, &resource.path)? {
    Some(id) => Ok(id),
    None => put_resource(conn, resource),
  }
}

pub(super) fn find_resource(conn: &Connection, path: &str) -> Result<Option<ResourceId>, StateError> {
  let id = conn.prepare_cached("SELECT id FROM resource WHERE path = ?1")?
    .query_row(params![path], |row| row.get(0))
    .optional()?;
  Ok(id.map(ResourceId))
}

pub(super) fn resource(conn: &Connection, id: ResourceId) -> Result<Resource, StateError> {
  conn.prepare_cached("SELECT path, status, checksum FROM resource WHERE id = ?1")?
    .query_row(params![id.0], |row| {
      Ok(Resource {
        path: row.get(0)?,
        status: ResourceStatus::from_i64(row.get(1)?),
        checksum: row.get(2)?,
      })
    })
    .optional()?
    .ok_or(StateError::NotFound { entity: "resource", id: id.0 })
}

pub(super) fn update_resource(conn: &Connection, id: ResourceId, resource: &Resource) -> Result<(), StateError> {
  conn.prepare_cached("UPDATE resource SET path = ?2, status = ?3, checksum = ?4 WHERE id = ?1")?
    .execute(params![id.0, resource.path, resource.status.to_i64(), resource.checksum])?;
  Ok(())
}

pub(super) fn remove_resource(conn: &Connection, id: ResourceId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM resource WHERE id = ?1")?.execute(params![id.0])?;
  Ok(())
}

pub(super) fn remove_resource_by_path(conn: &Connection, path: &str) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM resource WHERE path = ?1 AND id > 1")?.execute(params![path])?;
  Ok(())
}

/// All resources except the description, in insertion order.
pub(super) fn resources(conn: &Connection) -> Result<Vec<(ResourceId, Resource)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT id, path, status, checksum FROM resource WHERE id > 1 ORDER BY id",
  )?;
  let rows = stmt.query_map([], |row| {
    Ok((
      ResourceId(row.get(0)?),
      Resource {
        path: row.get(1)?,
        status: ResourceStatus::from_i64(row.get(2)?),
        checksum: row.get(3)?,
      },
    ))
  })?;
  rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(super) fn description(conn: &Connection) -> Result<Resource, StateError> {
  resource(conn, ResourceId::DESCRIPTION)
}

pub(super) fn set_description(conn: &Connection, path: &str, checksum: &[u8]) -> Result<(), StateError> {
  conn.prepare_cached("UPDATE resource SET path = ?1, status = 1, checksum = ?2 WHERE id = 1")?
    .execute(params![path, checksum])?;
  Ok(())
}

pub(super) fn put_task(conn: &Connection, task: &Task) -> Result<TaskId, StateError> {
  let commands = encode_commands(&task.commands)?;
  conn.prepare_cached(
    "INSERT INTO task(commands, working_dir, display, last_executed) VALUES (?1, ?2, ?3, ?4)",
  )?
    .execute(params![commands, task.working_dir, task.display, task.last_executed])
    .map_err(|e| key_conflict(e, "task", &format!("{} in {}", commands, task.working_dir)))?;
  Ok(TaskId(conn.last_insert_rowid()))
}

pub(super) fn add_task(conn: &Connection, task: &Task) -> Result<TaskId, StateError> {
  match find_task(conn, &task.commands, &task.working_dir)? {
    Some(id) => Ok(id),
    None => put_task(conn, task),
  }
}

pub(super) fn find_task(
  conn: &Connection,
  commands: &[Vec<String>],
  working_dir: &str,
) -> Result<Option<TaskId>, StateError> {
  let commands = encode_commands(commands)?;
  let id = conn.prepare_cached("SELECT id FROM task WHERE commands = ?1 AND working_dir = ?2")?
    .query_row(params![commands, working_dir], |row| row.get(0))
    .optional()?;
  Ok(id.map(TaskId))
}

pub(super) fn task(conn: &Connection, id: TaskId) -> Result<Task, StateError> {
  let row = conn.prepare_cached(
    "SELECT commands, working_dir, display, last_executed FROM task WHERE id = ?1",
  )?
    .query_row(params![id.0], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, Option<String>>(2)?,
        row.get::<_, i64>(3)?,
      ))
    })
    .optional()?;
  let Some((commands, working_dir, display, last_executed)) = row else {
    return Err(StateError::NotFound { entity: "task", id: id.0 });
  };
  Ok(Task { commands: decode_commands(&commands)?, working_dir, display, last_executed })
}

pub(super) fn update_task(conn: &Connection, id: TaskId, task: &Task) -> Result<(), StateError> {
  let commands = encode_commands(&task.commands)?;
  conn.prepare_cached(
    "UPDATE task SET commands = ?2, working_dir = ?3, display = ?4, last_executed = ?5 WHERE id = ?1",
  )?
    .execute(params![id.0, commands, task.working_dir, task.display, task.last_executed])?;
  Ok(())
}

pub(super) fn remove_task(conn: &Connection, id: TaskId) -> Result<(), StateError> {
  conn.prepare_cached("DELETE FROM task WHERE id = ?1")?.execute(params![id.0])?;
  Ok(())
}

pub(super) fn remove_task_by_key(
  conn: &Connection,
  commands: &[Vec<String>],
  working_dir: &str,
) -> Result<(), StateError> {
  let commands = encode_commands(commands)?;
  conn.prepare_cached("DELETE FROM task WHERE commands = ?1 AND working_dir = ?2")?
    .execute(params![commands, working_dir])?;
  Ok(())
}

/// All tasks in insertion order.
pub(super) fn tasks(conn: &Connection) -> Result<Vec<(TaskId, Task)>, StateError> {
  let mut stmt = conn.prepare_cached(
    "SELECT id, commands, working_dir, display, last_executed FROM task ORDER BY id",
  )?;
  let rows = stmt.query_map([], |row| {
    Ok((
      TaskId(row.get(0)?),
      row.get::<_, String>(1)?,
      row.get::<_, String>(2)?,
      row.get::<_, Option<String>>(3)?,
      row.get::<_, i64>(4)?,
    ))
  })?;
  let mut out = Vec::new();
  for row in rows {
    let (id, commands, working_dir, display, last_executed) = row?;
    out.push((id, Task { commands: decode_commands(&commands)?, working_dir, display, last_executed }));
  }
  Ok(out)
}

fn encode_commands(commands: &[Vec<String>]) -> Result<String, StateError> {
  Ok(serde_json::to_string(commands)?)
}

fn decode_commands(text: &str) -> Result<Vec<Vec<String>>, StateError> {
  Ok(serde_json::from_str(text)?)
}

fn key_conflict(e: rusqlite::Error, entity: &'static str, key: &str) -> StateError {
  match e {
    rusqlite::Error::SqliteFailure(f, _)
      if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
    {
      StateError::AlreadyExists { entity, key: key.to_string() }
    }
    e => StateError::Sql(e),
  }
}
