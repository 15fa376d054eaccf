//! Snowflake SQL API (v2) backend

use super::types::{Binding, ResultSet, Statement};
use super::{WarehouseError, WarehouseService};
use crate::config::WarehouseConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

const STATEMENTS_PATH: &str = "/api/v2/statements";
const POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Extra time allowed past the statement timeout before giving up on polling
const POLL_GRACE: Duration = Duration::from_secs(30);

/// Executes statements through the SQL REST API
pub struct SnowflakeService {
    client: Client,
    config: WarehouseConfig,
    base_url: String,
    poll_interval: Duration,
    poll_grace: Duration,
}

impl SnowflakeService {
    pub fn new(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        let client = Client::builder()
            .timeout(config.statement_timeout + POLL_GRACE)
            .user_agent(concat!("helpdocs-chat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WarehouseError::network(format!("Failed to create HTTP client: {e}")))?;

        let base_url = config.base_url();
        Ok(Self {
            client,
            config,
            base_url,
            poll_interval: POLL_INTERVAL,
            poll_grace: POLL_GRACE,
        })
    }

    /// Override how often a running statement is polled and how long past
    /// the statement timeout polling may continue
    #[cfg(test)]
    #[must_use]
    pub fn with_polling(mut self, interval: Duration, grace: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_grace = grace;
        self
    }

    fn translate_request<'a>(&'a self, statement: &'a Statement) -> SqlApiRequest<'a> {
        let bindings: BTreeMap<String, &Binding> = statement
            .bindings
            .iter()
            .enumerate()
            .map(|(i, binding)| ((i + 1).to_string(), binding))
            .collect();

        SqlApiRequest {
            statement: &statement.sql,
            timeout: self.config.statement_timeout.as_secs(),
            warehouse: self.config.warehouse.as_deref(),
            database: self.config.database.as_deref(),
            schema: self.config.schema.as_deref(),
            role: self.config.role.as_deref(),
            bindings,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.config.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
    }

    async fn submit(&self, statement: &Statement) -> Result<(StatusCode, String), WarehouseError> {
        let url = format!("{}{STATEMENTS_PATH}", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&self.translate_request(statement))
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }

    async fn poll(&self, status_url: &str) -> Result<(StatusCode, String), WarehouseError> {
        let url = if status_url.starts_with("http") {
            status_url.to_string()
        } else {
            format!("{}{status_url}", self.base_url)
        };
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;
        read_body(response).await
    }
}

#[async_trait]
impl WarehouseService for SnowflakeService {
    async fn execute(&self, statement: &Statement) -> Result<ResultSet, WarehouseError> {
        let deadline = Instant::now() + self.config.statement_timeout + self.poll_grace;
        let (mut status, mut body) = self.submit(statement).await?;

        // 202 means the statement is still running; follow its status URL
        while status == StatusCode::ACCEPTED {
            let pending: PendingResponse = serde_json::from_str(&body).map_err(|e| {
                WarehouseError::malformed(format!("Failed to parse pending response: {e}"))
            })?;
            let status_url = pending.statement_status_url.unwrap_or_else(|| {
                format!("{STATEMENTS_PATH}/{}", pending.statement_handle)
            });

            if Instant::now() >= deadline {
                return Err(WarehouseError::timeout(format!(
                    "Statement {} did not finish within {}s",
                    pending.statement_handle,
                    self.config.statement_timeout.as_secs()
                )));
            }

            tracing::debug!(handle = %pending.statement_handle, "Statement still running");
            tokio::time::sleep(self.poll_interval).await;
            (status, body) = self.poll(&status_url).await?;
        }

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        parse_result_set(&body)
    }

    fn name(&self) -> &str {
        &self.config.account
    }
}

async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String), WarehouseError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| WarehouseError::network(format!("Failed to read response: {e}")))?;
    Ok((status, body))
}

fn transport_error(e: reqwest::Error) -> WarehouseError {
    if e.is_timeout() {
        WarehouseError::timeout(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        WarehouseError::network(format!("Connection failed: {e}"))
    } else {
        WarehouseError::unknown(format!("Request failed: {e}"))
    }
}

/// Map a failed HTTP exchange to an error, preferring the API's own message
fn classify_error(status: StatusCode, body: &str) -> WarehouseError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.to_string());

    match status.as_u16() {
        401 | 403 => WarehouseError::auth(format!("Authentication failed: {message}")),
        408 => WarehouseError::timeout(format!("Statement timed out: {message}")),
        400 | 422 => WarehouseError::query(format!("Query failed: {message}")),
        429 | 500..=599 => {
            WarehouseError::server_error(format!("Server error ({status}): {message}"))
        }
        _ => WarehouseError::unknown(format!("HTTP {status}: {message}")),
    }
}

fn parse_result_set(body: &str) -> Result<ResultSet, WarehouseError> {
    let response: SqlApiResponse = serde_json::from_str(body)
        .map_err(|e| WarehouseError::malformed(format!("Failed to parse response: {e}")))?;

    let columns = response
        .result_set_meta_data
        .map(|meta| meta.row_type.into_iter().map(|c| c.name).collect())
        .unwrap_or_default();

    Ok(ResultSet::new(columns, response.data.unwrap_or_default()))
}

// SQL API wire types

#[derive(Debug, Serialize)]
struct SqlApiRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    bindings: BTreeMap<String, &'a Binding>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SqlApiResponse {
    result_set_meta_data: Option<ResultSetMetaData>,
    data: Option<Vec<Vec<Option<String>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingResponse {
    statement_handle: String,
    statement_status_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}
