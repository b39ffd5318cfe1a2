//! HTTP client for PostgREST-compatible backends.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method as HttpMethod, RequestBuilder, StatusCode};
use serde_json::{Value, json};

use super::RemoteBackend;
use crate::error::{Error, RemoteError, RemoteErrorKind, RemoteResult, Result};
use crate::query::{DEFAULT_PAGE_SIZE, Direction, Query};
use crate::record::Record;
use crate::tenant::{GLOBAL_SCHEMA, Namespace};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DDL_FUNCTION: &str = "exec_sql";

/// Connection settings for [`PostgrestClient`].
#[derive(Clone)]
pub struct PostgrestConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`. `/rest/v1` is appended.
    pub base_url: String,
    /// API key sent as `apikey` and bearer token.
    pub api_key: String,
    /// Upper bound per call.
    pub timeout: Duration,
    /// Name of the RPC function that executes raw statements.
    pub ddl_function: String,
    /// Rows per page when a select has an offset but no limit.
    pub page_size: usize,
}

impl PostgrestConfig {
    /// Creates a config with default timeout and DDL function.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            ddl_function: DEFAULT_DDL_FUNCTION.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the default page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .field("ddl_function", &self.ddl_function)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// PostgREST implementation of [`RemoteBackend`].
#[derive(Clone)]
pub struct PostgrestClient {
    rest_url: String,
    ddl_function: String,
    page_size: usize,
    client: reqwest::Client,
}

impl PostgrestClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if the URL or key cannot be used in a
    /// request, or `Error::Internal` if the HTTP client cannot be built.
    pub fn new(config: &PostgrestConfig) -> Result<Self> {
        let base = config.base_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "remote URL must start with http:// or https://: {base}"
            )));
        }

        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| Error::InvalidInput("remote API key is not a valid header".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| Error::InvalidInput("remote API key is not a valid header".into()))?;
        headers.insert("apikey", key);
        headers.insert(reqwest::header::AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Internal {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let rest_url = if base.ends_with("/rest/v1") {
            base.to_string()
        } else {
            format!("{base}/rest/v1")
        };

        Ok(Self {
            rest_url,
            ddl_function: config.ddl_function.clone(),
            page_size: config.page_size,
            client,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    fn rpc_url(&self) -> String {
        format!("{}/rpc/{}", self.rest_url, self.ddl_function)
    }

    fn request(
        &self,
        method: HttpMethod,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RequestBuilder {
        let mut req = self
            .client
            .request(method.clone(), self.table_url(table))
            .query(&filter_params(query));

        let schema = namespace.schema_name();
        if schema != GLOBAL_SCHEMA {
            let profile = if method == HttpMethod::GET {
                "Accept-Profile"
            } else {
                "Content-Profile"
            };
            req = req.header(profile, schema);
        }
        if method != HttpMethod::GET {
            req = req.header("Prefer", "return=representation");
        }
        req
    }

    async fn rows(req: RequestBuilder) -> RemoteResult<Vec<Record>> {
        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let value: Value = serde_json::from_str(&body).map_err(|e| {
            RemoteError::new(
                RemoteErrorKind::Rejected,
                format!("invalid response body: {e}"),
            )
        })?;
        let items = match value {
            Value::Array(items) => items,
            obj @ Value::Object(_) => vec![obj],
            other => {
                return Err(RemoteError::new(
                    RemoteErrorKind::Rejected,
                    format!("expected rows, got {other}"),
                ));
            }
        };
        items
            .into_iter()
            .map(|item| {
                Record::from_json(item)
                    .map_err(|e| RemoteError::new(RemoteErrorKind::Rejected, e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl RemoteBackend for PostgrestClient {
    async fn select(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let mut params = Vec::new();
        if let Some(order) = &query.order_by {
            let dir = match order.direction {
                Direction::Asc => "asc",
                Direction::Desc => "desc",
            };
            params.push(("order".to_string(), format!("{}.{dir}", order.column)));
        }
        if let Some((offset, len)) = query.window(self.page_size) {
            params.push(("limit".to_string(), len.to_string()));
            if offset > 0 {
                params.push(("offset".to_string(), offset.to_string()));
            }
        }

        let req = self
            .request(HttpMethod::GET, namespace, table, query)
            .query(&params);
        Self::rows(req).await
    }

    async fn insert(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let payload = query
            .payload()
            .map_err(|e| RemoteError::new(RemoteErrorKind::Rejected, e.to_string()))?;
        let req = self
            .request(HttpMethod::POST, namespace, table, query)
            .json(payload);
        Self::rows(req).await
    }

    async fn update(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let patch = query
            .payload()
            .and_then(|p| p.single().cloned())
            .map_err(|e| RemoteError::new(RemoteErrorKind::Rejected, e.to_string()))?;
        let req = self
            .request(HttpMethod::PATCH, namespace, table, query)
            .json(&patch);
        Self::rows(req).await
    }

    async fn delete(
        &self,
        namespace: &Namespace,
        table: &str,
        query: &Query,
    ) -> RemoteResult<Vec<Record>> {
        let req = self.request(HttpMethod::DELETE, namespace, table, query);
        Self::rows(req).await
    }

    async fn execute_statement(&self, sql: &str) -> RemoteResult<()> {
        let response = self
            .client
            .post(self.rpc_url())
            .json(&json!({ "sql": sql }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.map_err(transport_error)?;
        Err(classify_error(status, &body))
    }
}

/// Equality filters as PostgREST query parameters (`column=eq.value`).
fn filter_params(query: &Query) -> Vec<(String, String)> {
    query
        .filter
        .iter()
        .map(|cond| {
            let operand = match &cond.value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{s}"),
                other => format!("eq.{other}"),
            };
            (cond.column.clone(), operand)
        })
        .collect()
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    let what = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    RemoteError::transient(format!("{what}: {err}"))
}

/// Classifies a non-success PostgREST response.
///
/// The body is expected to be PostgREST's error object
/// (`{"code", "message", "details", "hint"}`); anything else is classified by
/// status alone.
#[must_use]
pub fn classify_error(status: StatusCode, body: &str) -> RemoteError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let code = field("code");
    let message = field("message").unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        }
    });

    let kind = match code.as_deref() {
        Some("PGRST204" | "42703") => RemoteErrorKind::UnknownColumn {
            column: parse_column(&message),
        },
        Some("22P02" | "42804" | "22003" | "22007" | "22008") => RemoteErrorKind::TypeMismatch,
        Some("42P01" | "3F000" | "PGRST205" | "PGRST106" | "PGRST202") => {
            RemoteErrorKind::NotFound
        }
        Some("42P06" | "42P07" | "42710") => RemoteErrorKind::AlreadyExists,
        _ if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error() =>
        {
            RemoteErrorKind::Transient
        }
        _ if status == StatusCode::NOT_FOUND => RemoteErrorKind::NotFound,
        _ => RemoteErrorKind::Rejected,
    };

    let err = RemoteError::new(kind, message);
    match code {
        Some(code) => err.with_code(code),
        None => err,
    }
}

/// Extracts the column name from an unknown-column message.
///
/// Handles `Could not find the 'col' column of 'tbl' ...`,
/// `column "col" of relation "tbl" does not exist` and
/// `column tbl.col does not exist`.
fn parse_column(message: &str) -> Option<String> {
    for quote in ['\'', '"'] {
        if let Some(start) = message.find(quote) {
            let rest = &message[start + 1..];
            if let Some(end) = rest.find(quote) {
                let column = &rest[..end];
                if !column.is_empty() {
                    return Some(column.to_string());
                }
            }
        }
    }

    let rest = message.split_once("column ")?.1;
    let token = rest.split_whitespace().next()?;
    let column = token.rsplit('.').next()?;
    (!column.is_empty()).then(|| column.to_string())
}
