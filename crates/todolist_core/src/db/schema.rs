//! `todos` table definition.

use super::DbResult;
use rusqlite::Connection;

/// Table holding one row per todo item.
pub const TODOS_TABLE: &str = "todos";

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS todos (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    completed INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_todos_created_at ON todos (created_at);
";

/// Creates the `todos` table when absent. Safe to call on every open.
pub fn apply_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
