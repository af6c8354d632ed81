//! In-process table client.
//!
//! Mirrors the remote service's status semantics (404 `TableNotFound` or
//! `ResourceNotFound`, 409 for duplicates) so the table backend can be exercised
//! without a network. Clones share state.

use super::client::{TableClient, TableError, TableResult, TodoEntity, TABLE_NOT_FOUND_CODE};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Rows = BTreeMap<(String, String), TodoEntity>;

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, Rows>,
    forbid_create: bool,
    fail_next: Option<u16>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryTableClient {
    state: Arc<Mutex<State>>,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-creates a table, as if provisioned out of band.
    pub fn with_table(self, table: &str) -> Self {
        self.lock().tables.entry(table.to_string()).or_default();
        self
    }

    /// Makes `create_table` fail with 403, like a data-only role assignment.
    pub fn forbid_table_creation(self) -> Self {
        self.lock().forbid_create = true;
        self
    }

    /// Makes the next call fail with the given HTTP status.
    pub fn fail_next(&self, status: u16) {
        self.lock().fail_next = Some(status);
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.lock().tables.contains_key(table)
    }

    /// Returns one stored entity without going through the contract.
    pub fn entity(&self, table: &str, partition_key: &str, row_key: &str) -> Option<TodoEntity> {
        self.lock()
            .tables
            .get(table)
            .and_then(|rows| rows.get(&key(partition_key, row_key)))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> TableResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        if let Some(status) = state.fail_next.take() {
            return Err(TableError::from_status(status, "InjectedFailure"));
        }
        Ok(state)
    }
}

fn key(partition_key: &str, row_key: &str) -> (String, String) {
    (partition_key.to_string(), row_key.to_string())
}

fn rows_mut<'a>(state: &'a mut State, table: &str) -> TableResult<&'a mut Rows> {
    state
        .tables
        .get_mut(table)
        .ok_or_else(|| TableError::TableNotFound {
            code: TABLE_NOT_FOUND_CODE.to_string(),
        })
}

fn entity_not_found() -> TableError {
    TableError::NotFound {
        code: "ResourceNotFound".to_string(),
    }
}

impl TableClient for MemoryTableClient {
    fn create_table(&self, table: &str) -> TableResult<()> {
        let mut state = self.begin()?;
        if state.forbid_create {
            return Err(TableError::Forbidden {
                code: "AuthorizationPermissionMismatch".to_string(),
            });
        }
        if state.tables.contains_key(table) {
            return Err(TableError::Conflict {
                code: "TableAlreadyExists".to_string(),
            });
        }
        state.tables.insert(table.to_string(), Rows::new());
        Ok(())
    }

    fn insert_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()> {
        let mut state = self.begin()?;
        let rows = rows_mut(&mut state, table)?;
        let entry_key = key(&entity.partition_key, &entity.row_key);
        if rows.contains_key(&entry_key) {
            return Err(TableError::Conflict {
                code: "EntityAlreadyExists".to_string(),
            });
        }
        rows.insert(entry_key, entity.clone());
        Ok(())
    }

    fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> TableResult<TodoEntity> {
        let mut state = self.begin()?;
        rows_mut(&mut state, table)?
            .get(&key(partition_key, row_key))
            .cloned()
            .ok_or_else(entity_not_found)
    }

    fn query_partition(&self, table: &str, partition_key: &str) -> TableResult<Vec<TodoEntity>> {
        let mut state = self.begin()?;
        Ok(rows_mut(&mut state, table)?
            .values()
            .filter(|entity| entity.partition_key == partition_key)
            .cloned()
            .collect())
    }

    fn merge_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()> {
        let mut state = self.begin()?;
        let stored = rows_mut(&mut state, table)?
            .get_mut(&key(&entity.partition_key, &entity.row_key))
            .ok_or_else(entity_not_found)?;
        *stored = entity.clone();
        Ok(())
    }

    fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> TableResult<()> {
        let mut state = self.begin()?;
        rows_mut(&mut state, table)?
            .remove(&key(partition_key, row_key))
            .map(|_| ())
            .ok_or_else(entity_not_found)
    }
}
