//! Remote table service seam.
//!
//! # Responsibility
//! - Define the entity shape stored in the table service.
//! - Define the minimal client surface the table backend depends on.
//! - Classify remote failures into typed statuses.
//!
//! # Invariants
//! - Not-found is detected from the HTTP status code (404), never from
//!   message text. A 404 for a missing table is kept apart from a missing
//!   entity.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type TableResult<T> = Result<T, TableError>;

/// Service error code for a 404 caused by the table itself being absent.
pub const TABLE_NOT_FOUND_CODE: &str = "TableNotFound";

/// Failures reported by a table client.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("table resource not found ({code})")]
    NotFound { code: String },
    #[error("table does not exist ({code})")]
    TableNotFound { code: String },
    #[error("table resource already exists ({code})")]
    Conflict { code: String },
    #[error("table request was not authenticated ({code})")]
    Unauthorized { code: String },
    #[error("table request is not permitted ({code})")]
    Forbidden { code: String },
    #[error("table service returned status {status} ({code})")]
    Status { status: u16, code: String },
    #[error("table transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid table endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("failed to decode table response: {0}")]
    Decode(String),
    #[error("credential unavailable: {0}")]
    Credential(String),
}

impl TableError {
    /// Classifies a non-success HTTP status.
    pub fn from_status(status: u16, code: impl Into<String>) -> Self {
        let code = code.into();
        match status {
            401 => Self::Unauthorized { code },
            403 => Self::Forbidden { code },
            404 if code == TABLE_NOT_FOUND_CODE => Self::TableNotFound { code },
            404 => Self::NotFound { code },
            409 => Self::Conflict { code },
            _ => Self::Status { status, code },
        }
    }

    /// True only for a missing entity; a missing table is a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// A todo row as stored in the table service.
///
/// Every row lives under one fixed partition with the item id as row key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    pub title: String,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Blocking client for one storage account's table service.
pub trait TableClient: Send {
    /// Creates a table. Fails with `Conflict` when it already exists.
    fn create_table(&self, table: &str) -> TableResult<()>;

    /// Inserts a new entity. Fails with `Conflict` when the key exists.
    fn insert_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()>;

    fn get_entity(&self, table: &str, partition_key: &str, row_key: &str)
        -> TableResult<TodoEntity>;

    /// Returns every entity in one partition, following continuations.
    fn query_partition(&self, table: &str, partition_key: &str) -> TableResult<Vec<TodoEntity>>;

    /// Merges properties into an existing entity. Fails with `NotFound`
    /// when the key does not exist.
    fn merge_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()>;

    fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> TableResult<()>;
}

#[cfg(test)]
mod tests {
    use super::TableError;

    #[test]
    fn from_status_separates_missing_table_from_missing_entity() {
        assert!(TableError::from_status(404, "ResourceNotFound").is_not_found());

        let table_gone = TableError::from_status(404, "TableNotFound");
        assert!(matches!(table_gone, TableError::TableNotFound { .. }));
        assert!(!table_gone.is_not_found());

        assert!(TableError::from_status(409, "EntityAlreadyExists").is_conflict());
        assert!(matches!(
            TableError::from_status(503, "ServerBusy"),
            TableError::Status { status: 503, .. }
        ));
    }
}
