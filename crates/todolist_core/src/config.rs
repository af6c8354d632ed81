//! Backend selection and configuration.
//!
//! # Responsibility
//! - Describe which backend to build and how to reach it, as plain data.
//! - Validate credential/endpoint combinations before any I/O happens.
//!
//! # Invariants
//! - Core code never reads process environment on its own; adapters call
//!   [`BackendConfig::from_env`] once and hand the result to the factory.
//! - Exactly one table-store authentication mode is active per config.

use crate::backend::table::{StorageConnectionString, TableTarget};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub const DEFAULT_SQLITE_PATH: &str = "todo.db";
pub const DEFAULT_TABLE_NAME: &str = "todos";
pub const TABLE_ENDPOINT_SUFFIX: &str = "table.core.windows.net";

pub const ENV_BACKEND: &str = "TODO_BACKEND";
pub const ENV_SQLITE_DB_PATH: &str = "SQLITE_DB_PATH";
pub const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const ENV_TABLE_NAME: &str = "AZURE_TABLE_NAME";
pub const ENV_ACCOUNT_NAME: &str = "AZURE_STORAGE_ACCOUNT_NAME";
pub const ENV_ACCOUNT_URL: &str = "AZURE_STORAGE_ACCOUNT_URL";
pub const ENV_USE_WORKLOAD_IDENTITY: &str = "USE_WORKLOAD_IDENTITY";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
pub const ENV_AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{2,62}$").expect("valid table name regex"));
static ACCOUNT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]{3,24}$").expect("valid account name regex"));

/// Fatal configuration problems, raised at construction and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown backend `{0}`; expected sqlite|azure")]
    UnknownBackend(String),
    #[error(
        "a storage connection string is required when workload identity is disabled \
         (set AZURE_STORAGE_CONNECTION_STRING)"
    )]
    MissingConnectionString,
    #[error(
        "workload identity requires an account URL or account name \
         (set AZURE_STORAGE_ACCOUNT_URL or AZURE_STORAGE_ACCOUNT_NAME)"
    )]
    MissingAccount,
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("invalid table name `{0}`; expected 3-63 alphanumeric characters starting with a letter")]
    InvalidTableName(String),
    #[error("invalid storage account name `{0}`; expected 3-24 lowercase letters or digits")]
    InvalidAccountName(String),
    #[error("invalid account URL `{0}`; expected an http(s) URL")]
    InvalidAccountUrl(String),
}

/// Which backend the service binds to, plus its settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    Sqlite(SqliteConfig),
    #[serde(rename = "azure")]
    Table(TableStoreConfig),
}

/// Settings for the embedded file-store backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    pub db_path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_SQLITE_PATH),
        }
    }
}

/// Settings for the cloud table-store backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStoreConfig {
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub account_name: Option<String>,
    #[serde(default)]
    pub account_url: Option<String>,
    #[serde(default)]
    pub use_workload_identity: bool,
    /// Platform-injected federation settings, used only with workload identity.
    #[serde(default)]
    pub workload_identity: WorkloadIdentityConfig,
}

/// Federated credential settings injected by the hosting platform.
///
/// Completeness is checked when the credential is built, not at validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadIdentityConfig {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub federated_token_file: Option<String>,
    #[serde(default)]
    pub authority_host: Option<String>,
}

impl Default for TableStoreConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            table_name: default_table_name(),
            account_name: None,
            account_url: None,
            use_workload_identity: false,
            workload_identity: WorkloadIdentityConfig::default(),
        }
    }
}

impl std::fmt::Debug for TableStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStoreConfig")
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "<redacted>"),
            )
            .field("table_name", &self.table_name)
            .field("account_name", &self.account_name)
            .field("account_url", &self.account_url)
            .field("use_workload_identity", &self.use_workload_identity)
            .field("workload_identity", &self.workload_identity)
            .finish()
    }
}

impl TableStoreConfig {
    /// Builds a connection-string mode config.
    pub fn with_connection_string(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: Some(connection_string.into()),
            ..Self::default()
        }
    }

    /// Builds a workload-identity mode config for an account name.
    pub fn with_workload_identity(account_name: impl Into<String>) -> Self {
        Self {
            account_name: Some(account_name.into()),
            use_workload_identity: true,
            ..Self::default()
        }
    }

    /// Validates the config and resolves where and how to connect.
    ///
    /// # Errors
    /// - `MissingConnectionString` when workload identity is off and no
    ///   connection string is set.
    /// - `MissingAccount` when workload identity is on and neither account
    ///   URL nor account name is set.
    /// - Name/URL/connection-string format errors.
    pub fn validate(&self) -> Result<TableTarget, ConfigError> {
        if !TABLE_NAME_RE.is_match(&self.table_name) {
            return Err(ConfigError::InvalidTableName(self.table_name.clone()));
        }

        if !self.use_workload_identity {
            let raw = non_empty(self.connection_string.as_deref())
                .ok_or(ConfigError::MissingConnectionString)?;
            let parsed = StorageConnectionString::parse(raw)?;
            return Ok(TableTarget::ConnectionString(parsed));
        }

        let endpoint = match (
            non_empty(self.account_url.as_deref()),
            non_empty(self.account_name.as_deref()),
        ) {
            (Some(url), _) => {
                let url = url.trim_end_matches('/');
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(ConfigError::InvalidAccountUrl(url.to_string()));
                }
                url.to_string()
            }
            (None, Some(name)) => {
                if !ACCOUNT_NAME_RE.is_match(name) {
                    return Err(ConfigError::InvalidAccountName(name.to_string()));
                }
                account_endpoint(name)
            }
            (None, None) => return Err(ConfigError::MissingAccount),
        };

        Ok(TableTarget::WorkloadIdentity {
            endpoint,
            identity: self.workload_identity.clone(),
        })
    }
}

impl BackendConfig {
    /// Reads backend settings from the process environment.
    ///
    /// Intended for adapters only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(|key| std::env::var(key).ok())
    }

    /// Reads backend settings through an injected variable lookup.
    ///
    /// `TODO_BACKEND` selects `sqlite` (default) or `azure`.
    pub fn from_env_map(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend = lookup(ENV_BACKEND)
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "sqlite".to_string());

        match backend.as_str() {
            "sqlite" => Ok(Self::Sqlite(SqliteConfig {
                db_path: lookup(ENV_SQLITE_DB_PATH)
                    .filter(|value| !value.trim().is_empty())
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH)),
            })),
            "azure" => Ok(Self::Table(TableStoreConfig {
                connection_string: lookup(ENV_CONNECTION_STRING),
                table_name: lookup(ENV_TABLE_NAME)
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(default_table_name),
                account_name: lookup(ENV_ACCOUNT_NAME),
                account_url: lookup(ENV_ACCOUNT_URL),
                use_workload_identity: lookup(ENV_USE_WORKLOAD_IDENTITY)
                    .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")),
                workload_identity: WorkloadIdentityConfig {
                    tenant_id: lookup(ENV_TENANT_ID),
                    client_id: lookup(ENV_CLIENT_ID),
                    federated_token_file: lookup(ENV_FEDERATED_TOKEN_FILE),
                    authority_host: lookup(ENV_AUTHORITY_HOST),
                },
            })),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }

    /// Short backend label for diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Table(_) => "azure",
        }
    }
}

/// Derives the table service endpoint from a storage account name.
pub fn account_endpoint(account_name: &str) -> String {
    format!("https://{account_name}.{TABLE_ENDPOINT_SUFFIX}")
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
