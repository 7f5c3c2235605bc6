use rusqlite::Connection;

use crate::error::StateError;

/// Tables and indices of the single-file state store. Foreign keys cascade so
/// removing a vertex drops its incident edges and pending entries; cascades
/// are authoritative, callers never pre-check degrees before removal.
/// AUTOINCREMENT keeps ids from being reused after removal.
const SQL: &str = r#"

        CREATE TABLE IF NOT EXISTS resource (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          path TEXT NOT NULL UNIQUE,
          status INTEGER NOT NULL DEFAULT 0,
          checksum BLOB NOT NULL DEFAULT x''
        );

        CREATE TABLE IF NOT EXISTS task (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          commands TEXT NOT NULL,
          working_dir TEXT NOT NULL,
          display TEXT,
          last_executed INTEGER NOT NULL DEFAULT 0,
          UNIQUE (commands, working_dir)
        );

        CREATE TABLE IF NOT EXISTS resource_edge (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          from_id INTEGER NOT NULL REFERENCES resource(id) ON DELETE CASCADE,
          to_id INTEGER NOT NULL REFERENCES task(id) ON DELETE CASCADE,
          kind INTEGER NOT NULL,
          UNIQUE (from_id, to_id)
        );

        CREATE TABLE IF NOT EXISTS task_edge (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          from_id INTEGER NOT NULL REFERENCES task(id) ON DELETE CASCADE,
          to_id INTEGER NOT NULL REFERENCES resource(id) ON DELETE CASCADE,
          kind INTEGER NOT NULL,
          UNIQUE (from_id, to_id)
        );

        CREATE TABLE IF NOT EXISTS pending_resource (
          id INTEGER PRIMARY KEY REFERENCES resource(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS pending_task (
          id INTEGER PRIMARY KEY REFERENCES task(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS resource_edge_to ON resource_edge(to_id);
        CREATE INDEX IF NOT EXISTS task_edge_to ON task_edge(to_id);
"#;

pub(super) fn init(conn: &Connection) -> Result<(), StateError> {
  conn.execute_batch(SQL)?;
  // Reserve row id=1 for the description resource; the empty path is the
  // never-synced placeholder and is rejected in rules.
  conn.execute(
    "INSERT OR IGNORE INTO resource(id, path, status, checksum) VALUES (1, '', 0, x'')",
    [],
  )?;
  Ok(())
}
