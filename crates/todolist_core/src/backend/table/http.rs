//! Table service REST client.
//!
//! # Responsibility
//! - Speak the table service JSON protocol over blocking HTTP.
//! - Authenticate with SharedKeyLite, SAS, or bearer tokens.
//!
//! # Invariants
//! - Non-success responses are classified by status code only.
//! - Partition scans follow continuation headers until exhausted.

use super::client::{TableClient, TableError, TableResult, TodoEntity};
use super::credential::{
    SharedSecret, StorageConnectionString, TokenCredential, WorkloadIdentityCredential,
};
use super::TableTarget;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::{debug, info};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;

const API_VERSION: &str = "2019-02-02";
const ODATA_NOMETADATA: &str = "application/json;odata=nometadata";
const DATA_SERVICE_VERSION: &str = "3.0;NetFx";
const NEXT_PARTITION_HEADER: &str = "x-ms-continuation-NextPartitionKey";
const NEXT_ROW_HEADER: &str = "x-ms-continuation-NextRowKey";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

enum Auth {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
    Bearer(Box<dyn TokenCredential>),
}

#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(default)]
    value: Vec<TodoEntity>,
}

/// Blocking table service client bound to one endpoint.
pub struct HttpTableClient {
    http: Client,
    endpoint: String,
    auth: Auth,
}

impl HttpTableClient {
    /// Builds a client for a validated connection target.
    ///
    /// Workload identity resolves its credential here.
    pub fn connect(target: &TableTarget) -> TableResult<Self> {
        match target {
            TableTarget::ConnectionString(parsed) => {
                info!("event=table_connect module=table status=start mode=connection_string");
                Self::with_connection_string(parsed)
            }
            TableTarget::WorkloadIdentity { endpoint, identity } => {
                info!("event=table_connect module=table status=start mode=workload_identity");
                let credential = WorkloadIdentityCredential::from_config(identity)?;
                Self::with_credential(endpoint, Box::new(credential))
            }
        }
    }

    pub fn with_connection_string(parsed: &StorageConnectionString) -> TableResult<Self> {
        let auth = match &parsed.secret {
            SharedSecret::AccountKey { account, key } => Auth::SharedKey {
                account: account.clone(),
                key: key.clone(),
            },
            SharedSecret::Sas(token) => Auth::Sas(token.clone()),
        };
        Self::build(&parsed.table_endpoint, auth)
    }

    pub fn with_credential(endpoint: &str, credential: Box<dyn TokenCredential>) -> TableResult<Self> {
        Self::build(endpoint, Auth::Bearer(credential))
    }

    fn build(endpoint: &str, auth: Auth) -> TableResult<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        Url::parse(&endpoint).map_err(|err| TableError::InvalidEndpoint(format!("{endpoint}: {err}")))?;
        Ok(Self {
            http: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            endpoint,
            auth,
        })
    }

    fn request(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
    ) -> TableResult<RequestBuilder> {
        self.request_at(method, resource, query, Utc::now())
    }

    /// Builds a signed request dated `now`.
    fn request_at(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
        now: DateTime<Utc>,
    ) -> TableResult<RequestBuilder> {
        let mut url = Url::parse(&format!("{}/{}", self.endpoint, resource))
            .map_err(|err| TableError::InvalidEndpoint(err.to_string()))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        if let Auth::Sas(token) = &self.auth {
            let merged = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{token}"),
                _ => token.clone(),
            };
            url.set_query(Some(&merged));
        }

        let date = http_date(now);
        let canonical_path = url.path().to_string();
        let mut builder = self
            .http
            .request(method, url)
            .header("x-ms-date", date.as_str())
            .header("x-ms-version", API_VERSION)
            .header(ACCEPT, ODATA_NOMETADATA)
            .header("DataServiceVersion", DATA_SERVICE_VERSION)
            .header("MaxDataServiceVersion", DATA_SERVICE_VERSION);

        builder = match &self.auth {
            Auth::SharedKey { account, key } => {
                let resource = format!("/{account}{canonical_path}");
                let signature = sign_shared_key_lite(key, &date, &resource)?;
                builder.header(AUTHORIZATION, format!("SharedKeyLite {account}:{signature}"))
            }
            Auth::Bearer(credential) => {
                builder.header(AUTHORIZATION, format!("Bearer {}", credential.token()?))
            }
            Auth::Sas(_) => builder,
        };

        Ok(builder)
    }

    fn send(&self, builder: RequestBuilder) -> TableResult<Response> {
        let response = builder.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = error_code(response);
        debug!(
            "event=table_request module=table status=error http_status={} error_code={}",
            status.as_u16(),
            code
        );
        Err(TableError::from_status(status.as_u16(), code))
    }
}

impl TableClient for HttpTableClient {
    fn create_table(&self, table: &str) -> TableResult<()> {
        let builder = self
            .request(Method::POST, "Tables", &[])?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return-no-content")
            .json(&json!({ "TableName": table }));
        self.send(builder)?;
        Ok(())
    }

    fn insert_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()> {
        let builder = self
            .request(Method::POST, table, &[])?
            .header(CONTENT_TYPE, "application/json")
            .header("Prefer", "return-no-content")
            .json(entity);
        self.send(builder)?;
        Ok(())
    }

    fn get_entity(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> TableResult<TodoEntity> {
        let builder = self.request(Method::GET, &entity_path(table, partition_key, row_key), &[])?;
        self.send(builder)?
            .json()
            .map_err(|err| TableError::Decode(err.to_string()))
    }

    fn query_partition(&self, table: &str, partition_key: &str) -> TableResult<Vec<TodoEntity>> {
        let filter = format!("PartitionKey eq '{}'", partition_key.replace('\'', "''"));
        let resource = format!("{table}()");
        let mut entities = Vec::new();
        let mut continuation: Option<(String, String)> = None;

        loop {
            let mut query = vec![("$filter", filter.as_str())];
            if let Some((next_partition, next_row)) = &continuation {
                query.push(("NextPartitionKey", next_partition.as_str()));
                query.push(("NextRowKey", next_row.as_str()));
            }

            let response = self.send(self.request(Method::GET, &resource, &query)?)?;
            let next = continuation_from(&response);
            let page: QueryPage = response
                .json()
                .map_err(|err| TableError::Decode(err.to_string()))?;
            entities.extend(page.value);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(entities)
    }

    fn merge_entity(&self, table: &str, entity: &TodoEntity) -> TableResult<()> {
        let builder = self
            .request(
                Method::PATCH,
                &entity_path(table, &entity.partition_key, &entity.row_key),
                &[],
            )?
            .header(CONTENT_TYPE, "application/json")
            .header("If-Match", "*")
            .json(entity);
        self.send(builder)?;
        Ok(())
    }

    fn delete_entity(&self, table: &str, partition_key: &str, row_key: &str) -> TableResult<()> {
        let builder = self
            .request(Method::DELETE, &entity_path(table, partition_key, row_key), &[])?
            .header("If-Match", "*");
        self.send(builder)?;
        Ok(())
    }
}

fn entity_path(table: &str, partition_key: &str, row_key: &str) -> String {
    format!(
        "{table}(PartitionKey='{}',RowKey='{}')",
        encode_key(partition_key),
        encode_key(row_key)
    )
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(&key.replace('\'', "''")).into_owned()
}

fn continuation_from(response: &Response) -> Option<(String, String)> {
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };
    let partition = header(NEXT_PARTITION_HEADER)?;
    Some((partition, header(NEXT_ROW_HEADER).unwrap_or_default()))
}

fn error_code(response: Response) -> String {
    if let Some(code) = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|value| value.to_str().ok())
    {
        return code.to_string();
    }

    response
        .json::<serde_json::Value>()
        .ok()
        .and_then(|body| {
            body.get("odata.error")
                .and_then(|error| error.get("code"))
                .and_then(|code| code.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "unknown".to_string())
}

fn http_date(value: DateTime<Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// SharedKeyLite signature: base64(HMAC-SHA256(key, "{date}\n{resource}")).
fn sign_shared_key_lite(key: &[u8], date: &str, canonical_resource: &str) -> TableResult<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|err| TableError::Credential(format!("invalid account key: {err}")))?;
    mac.update(format!("{date}\n{canonical_resource}").as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
