//! Snowflake warehouse client.
//!
//! Speaks the Snowflake session protocol over HTTPS: one login request opens
//! a session, every statement is a query request carrying the session token,
//! long-running statements are polled until they finish.

use crate::config::WorkspaceConfig;
use crate::db::keypair::KeyPair;
use crate::db::{ColumnInfo, QueryResult, Row, Value, Warehouse};
use crate::error::{Result, TransformationError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

/// HTTP timeout for a single request; longer statements are polled.
const HTTP_TIMEOUT_SECS: u64 = 120;

/// Delay between polls of a statement that is still running.
const POLL_INTERVAL_MS: u64 = 500;

/// Application name reported to Snowflake.
const CLIENT_APP_ID: &str = "Keboola_Connection";

/// Statement still running, result must be fetched from `getResultUrl`.
const CODE_QUERY_IN_PROGRESS: &str = "333333";
const CODE_QUERY_IN_PROGRESS_ASYNC: &str = "333334";

/// Object does not exist or not authorized.
const CODE_OBJECT_NOT_FOUND: &str = "002003";

/// Session token expired.
const CODE_SESSION_EXPIRED: &str = "390112";

/// Headers unlocking result chunks when the response names no `chunkHeaders`.
const SSE_C_ALGORITHM: &str = "x-amz-server-side-encryption-customer-algorithm";
const SSE_C_KEY: &str = "x-amz-server-side-encryption-customer-key";

/// Snowflake database client.
#[derive(Debug)]
pub struct SnowflakeClient {
    http: Client,
    base_url: Url,
    credentials: Credentials,
    token: RwLock<Option<String>>,
    sequence: AtomicU64,
}

/// Login parameters resolved from the workspace configuration.
#[derive(Debug, Clone)]
struct Credentials {
    account: String,
    user: String,
    secret: Secret,
    warehouse: Option<String>,
    database: String,
    schema: String,
}

/// How the login request proves the user's identity.
#[derive(Debug, Clone)]
enum Secret {
    Password(String),
    KeyPair(KeyPair),
}

impl Credentials {
    fn from_workspace(config: &WorkspaceConfig) -> Result<Self> {
        let account = account_name(config);
        let non_empty = |value: &Option<String>| value.clone().filter(|v| !v.is_empty());

        let secret = match (non_empty(&config.password), non_empty(&config.private_key)) {
            (Some(password), _) => Secret::Password(password),
            (None, Some(pem)) => Secret::KeyPair(KeyPair::from_pem(&account, &config.user, &pem)?),
            (None, None) => Secret::Password(String::new()),
        };

        Ok(Self {
            account,
            user: config.user.clone(),
            secret,
            warehouse: config.warehouse.clone(),
            database: config.database.clone(),
            schema: config.schema.clone(),
        })
    }
}

/// Envelope shared by every Snowflake response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    #[serde(default)]
    rowtype: Vec<RowType>,
    #[serde(default)]
    rowset: Vec<Vec<serde_json::Value>>,
    query_result_format: Option<String>,
    get_result_url: Option<String>,
    query_id: Option<String>,
    /// Row count of the whole result, inline rowset and chunks together.
    total: Option<u64>,
    #[serde(default)]
    chunks: Vec<ChunkRef>,
    chunk_headers: Option<HashMap<String, String>>,
    qrmk: Option<String>,
}

/// A part of a large result that has to be downloaded separately.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkRef {
    url: String,
    #[serde(default)]
    row_count: u64,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: u128,
}

impl SnowflakeClient {
    /// Opens a Snowflake session for the workspace.
    pub async fn connect(config: &WorkspaceConfig) -> Result<Self> {
        let credentials = Credentials::from_workspace(config)?;
        let base_url = base_url(config)?;
        let http = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                TransformationError::connection(format!("Failed to create HTTP client: {e}"))
            })?;

        let client = Self {
            http,
            base_url,
            credentials,
            token: RwLock::new(None),
            sequence: AtomicU64::new(0),
        };
        client.login().await?;
        Ok(client)
    }

    async fn login(&self) -> Result<()> {
        let mut url = self.endpoint("/session/v1/login-request")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("databaseName", &self.credentials.database)
                .append_pair("schemaName", &self.credentials.schema)
                .append_pair("request_id", &Uuid::new_v4().to_string());
            if let Some(warehouse) = &self.credentials.warehouse {
                pairs.append_pair("warehouse", warehouse);
            }
        }

        let body = json!({ "data": login_data(&self.credentials)? });

        debug!("Logging in to Snowflake account {}", self.credentials.account);
        let response = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_request_error)?;
        let envelope: Envelope<LoginData> = read_envelope(response).await?;

        if !envelope.success {
            return Err(TransformationError::connection(format!(
                "Snowflake login failed for user '{}': {}",
                self.credentials.user,
                envelope.message.unwrap_or_default()
            )));
        }

        let token = envelope
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| TransformationError::connection("Snowflake login returned no token"))?;
        *self.token.write().await = Some(token);
        debug!("Snowflake session opened");
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| TransformationError::internal(format!("Invalid endpoint {path}: {e}")))
    }

    async fn token(&self) -> Result<String> {
        self.token
            .read()
            .await
            .clone()
            .ok_or_else(|| TransformationError::connection("Snowflake session is closed"))
    }

    async fn submit(&self, sql: &str) -> Result<Envelope<QueryData>> {
        let token = self.token().await?;
        let mut url = self.endpoint("/queries/v1/query-request")?;
        url.query_pairs_mut()
            .append_pair("requestId", &Uuid::new_v4().to_string());

        let request = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            query_submission_time: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
        };

        let response = self
            .http
            .post(url)
            .header("Accept", "application/snowflake")
            .header("Authorization", authorization(&token))
            .json(&request)
            .send()
            .await
            .map_err(map_request_error)?;
        let mut envelope: Envelope<QueryData> = read_envelope(response).await?;

        while is_in_progress(envelope.code.as_deref()) {
            let result_path = envelope
                .data
                .as_ref()
                .and_then(|d| d.get_result_url.clone())
                .ok_or_else(|| {
                    TransformationError::query("Statement is running but no result URL was returned")
                })?;
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;

            let response = self
                .http
                .get(self.endpoint(&result_path)?)
                .header("Accept", "application/snowflake")
                .header("Authorization", authorization(&token))
                .send()
                .await
                .map_err(map_request_error)?;
            envelope = read_envelope(response).await?;
        }

        Ok(envelope)
    }

    async fn download_chunk(
        &self,
        chunk: &ChunkRef,
        headers: &[(String, String)],
    ) -> Result<Vec<Vec<serde_json::Value>>> {
        let mut request = self.http.get(&chunk.url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await.map_err(map_request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransformationError::connection(format!(
                "Result chunk download failed with HTTP {status}"
            )));
        }
        let body = response.text().await.map_err(|e| {
            TransformationError::connection(format!("Failed to read result chunk: {e}"))
        })?;
        parse_chunk(&body)
    }
}

#[async_trait]
impl Warehouse for SnowflakeClient {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let data = into_query_data(self.submit(sql).await?)?;

        let mut chunk_rows = Vec::new();
        if !data.chunks.is_empty() {
            let headers = chunk_headers(&data);
            for (index, chunk) in data.chunks.iter().enumerate() {
                debug!(
                    "Downloading result chunk {} of {} ({} rows)",
                    index + 1,
                    data.chunks.len(),
                    chunk.row_count
                );
                chunk_rows.extend(self.download_chunk(chunk, &headers).await?);
            }
        }

        into_query_result(data, chunk_rows)
    }

    async fn reconnect(&self) -> Result<()> {
        warn!("Reconnecting to Snowflake");
        *self.token.write().await = None;
        self.login().await
    }

    async fn close(&self) -> Result<()> {
        let Some(token) = self.token.write().await.take() else {
            return Ok(());
        };
        let mut url = self.endpoint("/session")?;
        url.query_pairs_mut().append_pair("delete", "true");

        self.http
            .post(url)
            .header("Accept", "application/snowflake")
            .header("Authorization", authorization(&token))
            .send()
            .await
            .map_err(map_request_error)?;
        debug!("Snowflake session closed");
        Ok(())
    }
}

/// Account name for the login request: explicit, or the first label of the host.
fn account_name(config: &WorkspaceConfig) -> String {
    config.account.clone().unwrap_or_else(|| {
        config
            .host
            .split('.')
            .next()
            .unwrap_or_default()
            .to_string()
    })
}

fn base_url(config: &WorkspaceConfig) -> Result<Url> {
    let mut url = Url::parse(&format!("https://{}", config.host)).map_err(|e| {
        TransformationError::config(format!("Invalid workspace host '{}': {e}", config.host))
    })?;
    if let Some(port) = config.port {
        url.set_port(Some(port)).map_err(|_| {
            TransformationError::config(format!("Invalid workspace port {port}"))
        })?;
    }
    Ok(url)
}

/// Login payload; key-pair workspaces send a signed token instead of a password.
fn login_data(credentials: &Credentials) -> Result<serde_json::Value> {
    let mut data = json!({
        "CLIENT_APP_ID": CLIENT_APP_ID,
        "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
        "ACCOUNT_NAME": credentials.account,
        "LOGIN_NAME": credentials.user,
        "SESSION_PARAMETERS": { "CLIENT_SESSION_KEEP_ALIVE": true },
    });
    match &credentials.secret {
        Secret::Password(password) => data["PASSWORD"] = json!(password),
        Secret::KeyPair(key) => {
            data["AUTHENTICATOR"] = json!("SNOWFLAKE_JWT");
            data["TOKEN"] = json!(key.token()?);
        }
    }
    Ok(data)
}

fn authorization(token: &str) -> String {
    format!("Snowflake Token=\"{token}\"")
}

fn is_in_progress(code: Option<&str>) -> bool {
    matches!(
        code,
        Some(CODE_QUERY_IN_PROGRESS) | Some(CODE_QUERY_IN_PROGRESS_ASYNC)
    )
}

fn map_request_error(error: reqwest::Error) -> TransformationError {
    TransformationError::connection(format!("Snowflake request failed: {error}"))
}

async fn read_envelope<T>(response: reqwest::Response) -> Result<Envelope<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| TransformationError::connection(format!("Failed to read response: {e}")))?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TransformationError::connection(format!(
            "Snowflake rejected the session ({status})"
        )));
    }
    if !status.is_success() {
        return Err(TransformationError::connection(format!(
            "Snowflake returned HTTP {status}: {body}"
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| TransformationError::connection(format!("Failed to parse response: {e}")))
}

/// Unwraps a finished statement, mapping failures by error code.
fn into_query_data(envelope: Envelope<QueryData>) -> Result<QueryData> {
    if !envelope.success {
        let message = envelope.message.unwrap_or_else(|| "Unknown error".to_string());
        return Err(match envelope.code.as_deref() {
            Some(CODE_OBJECT_NOT_FOUND) => TransformationError::not_found(message),
            Some(CODE_SESSION_EXPIRED) => TransformationError::connection(message),
            _ => TransformationError::query(message),
        });
    }

    let data = envelope.data.unwrap_or_default();
    if let Some(query_id) = &data.query_id {
        debug!("Statement finished, query id {}", query_id);
    }
    if data
        .query_result_format
        .as_deref()
        .is_some_and(|f| f.eq_ignore_ascii_case("arrow"))
    {
        return Err(TransformationError::query(
            "Snowflake returned an Arrow result set, only JSON results are supported",
        ));
    }
    Ok(data)
}

/// Joins the inline rowset with the downloaded chunk rows.
///
/// Fails when the rows read fall short of the total Snowflake reported.
fn into_query_result(
    data: QueryData,
    chunk_rows: Vec<Vec<serde_json::Value>>,
) -> Result<QueryResult> {
    let columns = data
        .rowtype
        .into_iter()
        .map(|t| ColumnInfo::new(t.name))
        .collect();
    let rows: Vec<Row> = data
        .rowset
        .into_iter()
        .chain(chunk_rows)
        .map(convert_row)
        .collect();

    if let Some(total) = data.total {
        if rows.len() as u64 != total {
            return Err(TransformationError::query(format!(
                "Result is incomplete: read {} of {} rows",
                rows.len(),
                total
            )));
        }
    }
    Ok(QueryResult::from_rowset(columns, rows))
}

fn chunk_headers(data: &QueryData) -> Vec<(String, String)> {
    match (&data.chunk_headers, &data.qrmk) {
        (Some(headers), _) if !headers.is_empty() => headers
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        (_, Some(key)) => vec![
            (SSE_C_ALGORITHM.to_string(), "AES256".to_string()),
            (SSE_C_KEY.to_string(), key.clone()),
        ],
        _ => Vec::new(),
    }
}

/// Chunk bodies are comma-separated row arrays without the outer brackets.
fn parse_chunk(body: &str) -> Result<Vec<Vec<serde_json::Value>>> {
    serde_json::from_str(&format!("[{body}]"))
        .map_err(|e| TransformationError::query(format!("Failed to parse result chunk: {e}")))
}

fn convert_row(values: Vec<serde_json::Value>) -> Row {
    values
        .into_iter()
        .map(|value| match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .unwrap_or_else(|| Value::Text(n.to_string())),
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        })
        .collect()
}
