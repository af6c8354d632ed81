//! Table-store backend over a cloud partitioned key-value table.
//!
//! # Responsibility
//! - Map the backend contract onto table entities.
//! - Validate authentication settings at construction.
//! - Translate remote not-found statuses into contract `None`/`false`.
//!
//! # Invariants
//! - Every row lives in the single partition [`TODO_PARTITION_KEY`], keyed
//!   by item id. A full-partition scan yields all items.
//! - `get_all` carries no ordering guarantee.
//! - Only a missing entity maps to `None`/`false`. A table deleted after
//!   `initialize` surfaces as `TableError::TableNotFound`, like any other
//!   transport or auth fault.
//!
//! One partition caps throughput at the service's per-partition limit and
//! keeps queries trivial.

use super::{assign_id_if_missing, BackendError, BackendKind, BackendResult, TodoBackend};
use crate::config::{ConfigError, TableStoreConfig, WorkloadIdentityConfig};
use crate::model::todo::{format_timestamp, TodoItem};
use log::{info, warn};

pub mod client;
pub mod credential;
pub mod http;
pub mod memory;

pub use client::{TableClient, TableError, TableResult, TodoEntity};
pub use credential::{
    SharedSecret, StorageConnectionString, TokenCredential, WorkloadIdentityCredential,
};
pub use http::HttpTableClient;
pub use memory::MemoryTableClient;

/// Fixed partition holding every todo row.
pub const TODO_PARTITION_KEY: &str = "todos";

/// Where and how to reach the table service, resolved from config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableTarget {
    ConnectionString(StorageConnectionString),
    WorkloadIdentity {
        endpoint: String,
        identity: WorkloadIdentityConfig,
    },
}

impl TableTarget {
    pub fn endpoint(&self) -> &str {
        match self {
            Self::ConnectionString(parsed) => parsed.table_endpoint.as_str(),
            Self::WorkloadIdentity { endpoint, .. } => endpoint.as_str(),
        }
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::ConnectionString(_) => "connection_string",
            Self::WorkloadIdentity { .. } => "workload_identity",
        }
    }
}

type Connector<C> = Box<dyn Fn(&TableTarget) -> TableResult<C> + Send>;

/// Table-backed todo storage.
pub struct TableTodoBackend<C: TableClient = HttpTableClient> {
    table_name: String,
    target: TableTarget,
    connector: Connector<C>,
    client: Option<C>,
}

impl TableTodoBackend<HttpTableClient> {
    /// Validates `config` and prepares an HTTP-backed instance.
    ///
    /// # Errors
    /// - `ConfigError` when the authentication mode is incomplete.
    pub fn new(config: TableStoreConfig) -> Result<Self, ConfigError> {
        Self::with_connector(config, Box::new(HttpTableClient::connect))
    }
}

impl<C: TableClient + Clone + 'static> TableTodoBackend<C> {
    /// Validates `config` and binds a pre-built client.
    ///
    /// The client is handed out on `initialize`; credentials in `config`
    /// are validated but not used to connect.
    pub fn with_client(config: TableStoreConfig, client: C) -> Result<Self, ConfigError> {
        Self::with_connector(config, Box::new(move |_: &TableTarget| Ok(client.clone())))
    }
}

impl<C: TableClient> TableTodoBackend<C> {
    fn with_connector(config: TableStoreConfig, connector: Connector<C>) -> Result<Self, ConfigError> {
        let target = config.validate()?;
        Ok(Self {
            table_name: config.table_name,
            target,
            connector,
            client: None,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn target(&self) -> &TableTarget {
        &self.target
    }

    fn client(&self) -> BackendResult<&C> {
        self.client.as_ref().ok_or(BackendError::NotInitialized)
    }
}

impl<C: TableClient> TodoBackend for TableTodoBackend<C> {
    fn kind(&self) -> BackendKind {
        BackendKind::Table
    }

    fn initialize(&mut self) -> BackendResult<()> {
        if self.client.is_some() {
            return Ok(());
        }

        info!(
            "event=table_init module=table status=start mode={} table={}",
            self.target.mode(),
            self.table_name
        );
        let client = (self.connector)(&self.target)?;

        match client.create_table(&self.table_name) {
            Ok(()) => info!(
                "event=table_init module=table status=ok table={} created=true",
                self.table_name
            ),
            Err(err @ (TableError::Conflict { .. } | TableError::Forbidden { .. })) => warn!(
                "event=table_init module=table status=tolerated table={} error={}",
                self.table_name, err
            ),
            Err(err) => return Err(err.into()),
        }

        self.client = Some(client);
        Ok(())
    }

    fn add(&self, item: TodoItem) -> BackendResult<TodoItem> {
        let client = self.client()?;
        let mut item = item;
        assign_id_if_missing(&mut item);
        item.validate()?;

        match client.insert_entity(&self.table_name, &entity_from_item(&item)) {
            Ok(()) => Ok(item),
            Err(err) if err.is_conflict() => Err(BackendError::AlreadyExists(item.id)),
            Err(err) => Err(err.into()),
        }
    }

    fn get(&self, id: &str) -> BackendResult<Option<TodoItem>> {
        match self
            .client()?
            .get_entity(&self.table_name, TODO_PARTITION_KEY, id)
        {
            Ok(entity) => Ok(Some(item_from_entity(entity)?)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn get_all(&self) -> BackendResult<Vec<TodoItem>> {
        self.client()?
            .query_partition(&self.table_name, TODO_PARTITION_KEY)?
            .into_iter()
            .map(item_from_entity)
            .collect()
    }

    fn update(&self, item: TodoItem) -> BackendResult<Option<TodoItem>> {
        let client = self.client()?;
        let mut item = item;
        item.touch();

        match client.merge_entity(&self.table_name, &entity_from_item(&item)) {
            Ok(()) => Ok(Some(item)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn delete(&self, id: &str) -> BackendResult<bool> {
        match self
            .client()?
            .delete_entity(&self.table_name, TODO_PARTITION_KEY, id)
        {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

fn entity_from_item(item: &TodoItem) -> TodoEntity {
    TodoEntity {
        partition_key: TODO_PARTITION_KEY.to_string(),
        row_key: item.id.clone(),
        title: item.title.clone(),
        completed: item.completed,
        created_at: format_timestamp(&item.created_at),
        updated_at: format_timestamp(&item.updated_at),
    }
}

fn item_from_entity(entity: TodoEntity) -> BackendResult<TodoItem> {
    TodoItem::with_timestamps(
        entity.row_key,
        entity.title,
        entity.completed,
        entity.created_at,
        entity.updated_at,
    )
    .map_err(Into::into)
}
