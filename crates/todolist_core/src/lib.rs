//! Core domain logic for the todo list service.
//! This crate is the single source of truth for item identity and
//! timestamp invariants, and hides storage engines behind one contract.

pub mod backend;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;

pub use backend::table::{MemoryTableClient, TableClient, TableTarget, TODO_PARTITION_KEY};
pub use backend::{
    open_backend, BackendError, BackendKind, BackendResult, SqliteTodoBackend, TableError,
    TableTodoBackend, TodoBackend,
};
pub use config::{BackendConfig, ConfigError, SqliteConfig, TableStoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::todo::{ModelError, TimestampInput, TodoItem};
pub use service::todo_service::{open_service, TaskUpdate, TodoService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
