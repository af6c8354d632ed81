//! File-store backend over an embedded SQLite database.
//!
//! # Responsibility
//! - Map the backend contract onto single-row parameterized statements.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - Each mutating statement commits before returning (autocommit).
//! - `get_all` returns items ordered by `created_at DESC`; rows inserted in
//!   the same microsecond fall back to insertion order, newest first.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Concurrent writers from other processes are not coordinated here.

use super::{assign_id_if_missing, BackendError, BackendKind, BackendResult, TodoBackend};
use crate::db::{open_db, open_db_in_memory};
use crate::model::todo::{format_timestamp, TodoItem};
use log::debug;
use rusqlite::{params, Connection, ErrorCode, Row};
use std::path::{Path, PathBuf};

const TODO_SELECT_SQL: &str = "SELECT
    id,
    title,
    completed,
    created_at,
    updated_at
FROM todos";

#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite-backed todo storage.
pub struct SqliteTodoBackend {
    location: Location,
    conn: Option<Connection>,
}

impl SqliteTodoBackend {
    /// Creates a backend for a database file. Nothing is opened until
    /// `initialize`.
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            location: Location::File(db_path.as_ref().to_path_buf()),
            conn: None,
        }
    }

    /// Creates a backend over a private in-memory database.
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            conn: None,
        }
    }

    /// Database file path, or `None` for in-memory storage.
    pub fn db_path(&self) -> Option<&Path> {
        match &self.location {
            Location::File(path) => Some(path.as_path()),
            Location::Memory => None,
        }
    }

    fn conn(&self) -> BackendResult<&Connection> {
        self.conn.as_ref().ok_or(BackendError::NotInitialized)
    }
}

impl TodoBackend for SqliteTodoBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn initialize(&mut self) -> BackendResult<()> {
        if self.conn.is_some() {
            return Ok(());
        }

        let conn = match &self.location {
            Location::File(path) => open_db(path)?,
            Location::Memory => open_db_in_memory()?,
        };
        self.conn = Some(conn);
        Ok(())
    }

    fn add(&self, item: TodoItem) -> BackendResult<TodoItem> {
        let conn = self.conn()?;
        let mut item = item;
        assign_id_if_missing(&mut item);
        item.validate()?;

        let inserted = conn.execute(
            "INSERT INTO todos (
                id,
                title,
                completed,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                item.id.as_str(),
                item.title.as_str(),
                bool_to_int(item.completed),
                format_timestamp(&item.created_at),
                format_timestamp(&item.updated_at),
            ],
        );

        match inserted {
            Ok(_) => {
                debug!("event=todo_add module=sqlite status=ok");
                Ok(item)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(BackendError::AlreadyExists(item.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get(&self, id: &str) -> BackendResult<Option<TodoItem>> {
        let mut stmt = self
            .conn()?
            .prepare(&format!("{TODO_SELECT_SQL} WHERE id = ?1;"))?;

        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_todo_row(row)?));
        }

        Ok(None)
    }

    fn get_all(&self) -> BackendResult<Vec<TodoItem>> {
        let mut stmt = self.conn()?.prepare(&format!(
            "{TODO_SELECT_SQL} ORDER BY created_at DESC, rowid DESC;"
        ))?;

        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_todo_row(row)?);
        }

        Ok(items)
    }

    fn update(&self, item: TodoItem) -> BackendResult<Option<TodoItem>> {
        let conn = self.conn()?;
        let mut item = item;
        item.touch();

        let changed = conn.execute(
            "UPDATE todos
             SET
                title = ?1,
                completed = ?2,
                updated_at = ?3
             WHERE id = ?4;",
            params![
                item.title.as_str(),
                bool_to_int(item.completed),
                format_timestamp(&item.updated_at),
                item.id.as_str(),
            ],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        Ok(Some(item))
    }

    fn delete(&self, id: &str) -> BackendResult<bool> {
        let changed = self.conn()?.execute("DELETE FROM todos WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }
}

fn parse_todo_row(row: &Row<'_>) -> BackendResult<TodoItem> {
    let id: String = row.get("id")?;

    let completed = match row.get::<_, i64>("completed")? {
        0 => false,
        1 => true,
        other => {
            return Err(BackendError::InvalidData(format!(
                "invalid completed value `{other}` in todos.completed for `{id}`"
            )));
        }
    };

    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let title: String = row.get("title")?;

    TodoItem::with_timestamps(id, title, completed, created_at, updated_at).map_err(Into::into)
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
