//! Table service credentials.
//!
//! # Responsibility
//! - Parse storage connection strings into endpoint + secret.
//! - Resolve workload-identity bearer tokens at runtime.
//!
//! # Invariants
//! - Secrets never appear in `Debug` output.
//! - Workload identity stores no secret; the federated token is read from
//!   the platform-mounted file on every refresh.
//! - Settings arrive through config; nothing here reads the environment.

use super::client::{TableError, TableResult};
use crate::config::{
    ConfigError, WorkloadIdentityConfig, ENV_CLIENT_ID, ENV_FEDERATED_TOKEN_FILE, ENV_TENANT_ID,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

pub const DEV_STORAGE_ACCOUNT: &str = "devstoreaccount1";
pub const DEV_STORAGE_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
pub const DEV_STORAGE_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const TOKEN_REFRESH_MARGIN_SECS: i64 = 300;

/// Shared secret used to sign requests.
#[derive(Clone, PartialEq, Eq)]
pub enum SharedSecret {
    /// Account key (decoded) for SharedKeyLite signing.
    AccountKey { account: String, key: Vec<u8> },
    /// Pre-signed SAS query string, without the leading `?`.
    Sas(String),
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccountKey { account, .. } => f
                .debug_struct("AccountKey")
                .field("account", account)
                .field("key", &"<redacted>")
                .finish(),
            Self::Sas(_) => f.debug_tuple("Sas").field(&"<redacted>").finish(),
        }
    }
}

/// Parsed storage connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct StorageConnectionString {
    pub table_endpoint: String,
    pub secret: SharedSecret,
}

impl std::fmt::Debug for StorageConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match &self.secret {
            SharedSecret::AccountKey { .. } => "account_key",
            SharedSecret::Sas(_) => "sas",
        };
        f.debug_struct("StorageConnectionString")
            .field("table_endpoint", &self.table_endpoint)
            .field("auth", &auth)
            .finish()
    }
}

impl StorageConnectionString {
    /// Parses `Key=Value;...` connection strings.
    ///
    /// Supports `AccountName`/`AccountKey`, `SharedAccessSignature`,
    /// explicit `TableEndpoint`, derived endpoints from
    /// `DefaultEndpointsProtocol` + `EndpointSuffix`, and
    /// `UseDevelopmentStorage=true`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for segment in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString(format!(
                    "segment `{}` is not key=value",
                    segment_name(segment)
                ))
            })?;
            pairs.push((key.trim().to_string(), value.trim().to_string()));
        }
        let lookup = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
                .filter(|value| !value.is_empty())
        };

        if lookup("UseDevelopmentStorage").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Ok(Self {
                table_endpoint: DEV_STORAGE_TABLE_ENDPOINT.to_string(),
                secret: SharedSecret::AccountKey {
                    account: DEV_STORAGE_ACCOUNT.to_string(),
                    key: decode_account_key(DEV_STORAGE_KEY)?,
                },
            });
        }

        let account = lookup("AccountName");
        let table_endpoint = match (lookup("TableEndpoint"), account) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(account)) => format!(
                "{}://{}.table.{}",
                lookup("DefaultEndpointsProtocol").unwrap_or("https"),
                account,
                lookup("EndpointSuffix").unwrap_or("core.windows.net")
            ),
            (None, None) => {
                return Err(ConfigError::InvalidConnectionString(
                    "missing AccountName or TableEndpoint".to_string(),
                ))
            }
        };

        let secret = match (account, lookup("AccountKey"), lookup("SharedAccessSignature")) {
            (Some(account), Some(key), _) => SharedSecret::AccountKey {
                account: account.to_string(),
                key: decode_account_key(key)?,
            },
            (_, _, Some(sas)) => SharedSecret::Sas(sas.trim_start_matches('?').to_string()),
            _ => {
                return Err(ConfigError::InvalidConnectionString(
                    "missing AccountName/AccountKey or SharedAccessSignature".to_string(),
                ))
            }
        };

        Ok(Self {
            table_endpoint,
            secret,
        })
    }
}

fn decode_account_key(value: &str) -> Result<Vec<u8>, ConfigError> {
    STANDARD
        .decode(value)
        .map_err(|_| ConfigError::InvalidConnectionString("AccountKey is not base64".to_string()))
}

// Only the key name goes into error messages.
fn segment_name(segment: &str) -> &str {
    segment.split('=').next().unwrap_or_default()
}

/// Source of bearer tokens for the table service.
pub trait TokenCredential: Send + Sync {
    fn token(&self) -> TableResult<String>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Federated workload identity (projected service-account token exchanged
/// for an Entra ID access token).
pub struct WorkloadIdentityCredential {
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
    authority_host: String,
    http: reqwest::blocking::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl WorkloadIdentityCredential {
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
        authority_host: Option<String>,
    ) -> TableResult<Self> {
        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            authority_host: authority_host
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: reqwest::blocking::Client::builder().build()?,
            cached: Mutex::new(None),
        })
    }

    /// Builds the credential from resolved workload identity settings.
    ///
    /// # Errors
    /// - `Credential` when tenant, client id or token file is missing.
    pub fn from_config(settings: &WorkloadIdentityConfig) -> TableResult<Self> {
        let required = |value: &Option<String>, name: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| TableError::Credential(format!("{name} is not set")))
        };
        let credential = Self::new(
            required(&settings.tenant_id, ENV_TENANT_ID)?,
            required(&settings.client_id, ENV_CLIENT_ID)?,
            required(&settings.federated_token_file, ENV_FEDERATED_TOKEN_FILE)?,
            settings
                .authority_host
                .clone()
                .filter(|value| !value.trim().is_empty()),
        )?;
        info!("event=credential_resolve module=table status=ok mode=workload_identity");
        Ok(credential)
    }

    fn fetch(&self) -> TableResult<CachedToken> {
        let assertion = std::fs::read_to_string(&self.token_file).map_err(|err| {
            TableError::Credential(format!(
                "failed to read federated token `{}`: {err}",
                self.token_file.display()
            ))
        })?;

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host, self.tenant_id
        );
        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("scope", STORAGE_SCOPE),
                ("grant_type", "client_credentials"),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.trim()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(TableError::Credential(format!(
                "token endpoint returned status {}",
                status.as_u16()
            )));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|err| TableError::Decode(err.to_string()))?;
        debug!(
            "event=token_fetch module=table status=ok expires_in={}",
            body.expires_in
        );
        Ok(CachedToken {
            value: body.access_token,
            expires_at: Utc::now() + TimeDelta::seconds(body.expires_in),
        })
    }
}

impl TokenCredential for WorkloadIdentityCredential {
    fn token(&self) -> TableResult<String> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        let margin = TimeDelta::seconds(TOKEN_REFRESH_MARGIN_SECS);
        if let Some(token) = cached.as_ref() {
            if token.expires_at - margin > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.fetch()?;
        let value = fresh.value.clone();
        *cached = Some(fresh);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        SharedSecret, StorageConnectionString, WorkloadIdentityCredential, DEV_STORAGE_TABLE_ENDPOINT,
    };
    use crate::config::{ConfigError, WorkloadIdentityConfig};

    const KEY: &str = "c2VjcmV0LWtleQ==";

    #[test]
    fn parses_account_key_string_with_derived_endpoint() {
        let parsed = StorageConnectionString::parse(&format!(
            "DefaultEndpointsProtocol=https;AccountName=acme;AccountKey={KEY};EndpointSuffix=core.windows.net"
        ))
        .unwrap();

        assert_eq!(parsed.table_endpoint, "https://acme.table.core.windows.net");
        assert_eq!(
            parsed.secret,
            SharedSecret::AccountKey {
                account: "acme".to_string(),
                key: b"secret-key".to_vec(),
            }
        );
    }

    #[test]
    fn explicit_table_endpoint_wins() {
        let parsed = StorageConnectionString::parse(&format!(
            "AccountName=acme;AccountKey={KEY};TableEndpoint=http://localhost:10002/acme/"
        ))
        .unwrap();
        assert_eq!(parsed.table_endpoint, "http://localhost:10002/acme");
    }

    #[test]
    fn parses_sas_string() {
        let parsed = StorageConnectionString::parse(
            "TableEndpoint=https://acme.table.core.windows.net;SharedAccessSignature=?sv=2019&sig=abc",
        )
        .unwrap();
        assert_eq!(parsed.secret, SharedSecret::Sas("sv=2019&sig=abc".to_string()));
    }

    #[test]
    fn development_storage_maps_to_emulator() {
        let parsed = StorageConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(parsed.table_endpoint, DEV_STORAGE_TABLE_ENDPOINT);
    }

    #[test]
    fn rejects_incomplete_strings() {
        assert!(matches!(
            StorageConnectionString::parse("AccountName=acme"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            StorageConnectionString::parse("mock-connection-string"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
        assert!(matches!(
            StorageConnectionString::parse("AccountName=acme;AccountKey=not base64!"),
            Err(ConfigError::InvalidConnectionString(_))
        ));
    }

    #[test]
    fn shared_secret_debug_keeps_account_and_hides_key() {
        let parsed =
            StorageConnectionString::parse(&format!("AccountName=acme;AccountKey={KEY}")).unwrap();
        let rendered = format!("{:?}", parsed.secret);
        assert!(rendered.contains("acme"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("secret-key"));
        assert!(!rendered.contains("115, 101, 99"));

        let sas = SharedSecret::Sas("sv=2019&sig=abc".to_string());
        assert!(!format!("{sas:?}").contains("sig=abc"));
    }

    #[test]
    fn workload_identity_settings_must_be_complete() {
        let settings = WorkloadIdentityConfig {
            tenant_id: Some("tenant".to_string()),
            client_id: Some("  ".to_string()),
            federated_token_file: Some("/var/run/token".to_string()),
            authority_host: None,
        };
        let err = WorkloadIdentityCredential::from_config(&settings).err().unwrap();
        assert!(err.to_string().contains("AZURE_CLIENT_ID"));

        let complete = WorkloadIdentityConfig {
            client_id: Some("client".to_string()),
            ..settings
        };
        assert!(WorkloadIdentityCredential::from_config(&complete).is_ok());
    }

    #[test]
    fn debug_output_hides_secret() {
        let parsed =
            StorageConnectionString::parse(&format!("AccountName=acme;AccountKey={KEY}")).unwrap();
        let rendered = format!("{parsed:?}");
        assert!(!rendered.contains(KEY));
        assert!(rendered.contains("account_key"));
    }
}
