//! Storage backend contract and implementations.
//!
//! # Responsibility
//! - Define the capability interface every storage engine satisfies.
//! - Build the one backend selected by configuration.
//!
//! # Invariants
//! - Every operation before `initialize` fails with `NotInitialized`.
//! - Not-found is `None`/`false`, never an error.
//! - Adding an id that already exists fails with `AlreadyExists` on every
//!   backend; nothing is overwritten.
//! - A successful `update` always refreshes `updated_at`.

use crate::config::{BackendConfig, ConfigError};
use crate::db::DbError;
use crate::model::todo::{ModelError, TodoItem};
use thiserror::Error;

pub mod sqlite;
pub mod table;

pub use sqlite::SqliteTodoBackend;
pub use table::{TableError, TableTodoBackend};

pub type BackendResult<T> = Result<T, BackendError>;

/// Storage and transport faults surfaced by backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend used before initialize()")]
    NotInitialized,
    #[error("todo item already exists: {0}")]
    AlreadyExists(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("invalid persisted todo data: {0}")]
    InvalidData(String),
}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<ModelError> for BackendError {
    fn from(value: ModelError) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// Storage engine family, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Table,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Table => "azure_table",
        }
    }
}

/// Capability interface for todo persistence.
///
/// Calls are blocking. Implementations are not required to serialize
/// concurrent read-modify-write sequences.
pub trait TodoBackend: Send {
    fn kind(&self) -> BackendKind;

    /// One-time setup. Repeated calls after success are no-ops.
    fn initialize(&mut self) -> BackendResult<()>;

    /// Persists a new item keyed by `item.id`, generating the id if empty.
    fn add(&self, item: TodoItem) -> BackendResult<TodoItem>;

    fn get(&self, id: &str) -> BackendResult<Option<TodoItem>>;

    /// Returns every item. Ordering is backend-specific.
    fn get_all(&self) -> BackendResult<Vec<TodoItem>>;

    /// Overwrites the stored record, refreshing `updated_at`.
    ///
    /// Returns `None` when no record with `item.id` exists.
    fn update(&self, item: TodoItem) -> BackendResult<Option<TodoItem>>;

    /// Returns whether a record was removed.
    fn delete(&self, id: &str) -> BackendResult<bool>;
}

impl<B: TodoBackend + ?Sized> TodoBackend for Box<B> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn initialize(&mut self) -> BackendResult<()> {
        (**self).initialize()
    }

    fn add(&self, item: TodoItem) -> BackendResult<TodoItem> {
        (**self).add(item)
    }

    fn get(&self, id: &str) -> BackendResult<Option<TodoItem>> {
        (**self).get(id)
    }

    fn get_all(&self) -> BackendResult<Vec<TodoItem>> {
        (**self).get_all()
    }

    fn update(&self, item: TodoItem) -> BackendResult<Option<TodoItem>> {
        (**self).update(item)
    }

    fn delete(&self, id: &str) -> BackendResult<bool> {
        (**self).delete(id)
    }
}

/// Builds the backend selected by `config`, not yet initialized.
///
/// # Errors
/// - `ConfigError` when the table-store settings are incomplete or invalid.
pub fn open_backend(config: &BackendConfig) -> Result<Box<dyn TodoBackend>, ConfigError> {
    match config {
        BackendConfig::Sqlite(sqlite) => Ok(Box::new(SqliteTodoBackend::new(&sqlite.db_path))),
        BackendConfig::Table(table) => Ok(Box::new(TableTodoBackend::new(table.clone())?)),
    }
}

pub(crate) fn assign_id_if_missing(item: &mut TodoItem) {
    if !item.has_id() {
        item.id = uuid::Uuid::new_v4().to_string();
    }
}
