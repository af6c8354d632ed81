//! SQLite storage bootstrap for the file-store backend.
//!
//! # Responsibility
//! - Open and configure SQLite connections.
//! - Apply the idempotent `todos` schema before any data access.
//!
//! # Invariants
//! - Core code must not read/write todo rows before the schema is applied.
//! - The parent directory of a file database exists after a successful open.

use std::path::PathBuf;
use thiserror::Error;

mod open;
pub mod schema;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create database directory `{}`: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
