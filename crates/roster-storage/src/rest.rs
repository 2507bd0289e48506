//! PostgREST-style HTTP client for the hosted roster store.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value as JsonValue;
use tracing::{info_span, Instrument};

use crate::{Filter, Operation, RemoteError, RemoteStore, SelectQuery, MAX_ROWS_PER_REQUEST};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
}

impl StoreConfig {
    /// `SUPABASE_URL` / `SUPABASE_ANON_KEY`, with the `VITE_` prefixed names as fallback.
    pub fn from_env() -> Result<Self> {
        let base_url = env_first(&["SUPABASE_URL", "VITE_SUPABASE_URL"])
            .context("SUPABASE_URL (or VITE_SUPABASE_URL) is not set")?;
        let api_key = env_first(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"])
            .context("SUPABASE_ANON_KEY (or VITE_SUPABASE_ANON_KEY) is not set")?;
        let timeout_secs = std::env::var("ROSTER_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);
        Ok(Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            user_agent: Some(
                std::env::var("ROSTER_USER_AGENT").unwrap_or_else(|_| "roster-sync/0.1".to_string()),
            ),
        })
    }
}

/// Render a filter value the way PostgREST expects inside `in.(...)` lists.
fn render_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) if s.contains([',', '(', ')', '"', ' ']) => {
            format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
        }
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq(column, JsonValue::Null) => (column.clone(), "is.null".to_string()),
            Filter::Neq(column, JsonValue::Null) => (column.clone(), "not.is.null".to_string()),
            Filter::Eq(column, value) => (column.clone(), format!("eq.{}", plain_value(value))),
            Filter::Neq(column, value) => (column.clone(), format!("neq.{}", plain_value(value))),
            Filter::In(column, values) => (
                column.clone(),
                format!(
                    "in.({})",
                    values.iter().map(render_value).collect::<Vec<_>>().join(",")
                ),
            ),
            Filter::Contains(column, needle) => (column.clone(), format!("ilike.*{needle}*")),
        })
        .collect()
}

fn plain_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn select_params(query: &SelectQuery) -> Result<Vec<(String, String)>, RemoteError> {
    let mut params = vec![("select".to_string(), query.columns.replace(' ', ""))];
    if let Some(order) = &query.order {
        params.push(("order".to_string(), format!("{order}.asc")));
    }
    if let Some(range) = query.range {
        if range.limit > MAX_ROWS_PER_REQUEST {
            return Err(RemoteError::RangeTooLarge {
                requested: range.limit,
            });
        }
        params.push(("offset".to_string(), range.offset.to_string()));
        params.push(("limit".to_string(), range.limit.to_string()));
    }
    params.extend(filter_params(&query.filters));
    Ok(params)
}

/// Total from a `Content-Range` header such as `0-24/3573` or `*/0`.
pub fn parse_content_range(header: &str) -> Option<usize> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
}

impl RestStore {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.api_key).context("api key is not a valid header value")?,
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))
                .context("api key is not a valid bearer token")?,
        );

        let mut builder = Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .default_headers(headers);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    async fn send(
        &self,
        table: &str,
        operation: Operation,
        request: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let span = info_span!("remote_request", table, %operation);
        let response = request.send().instrument(span).await.map_err(|source| RemoteError::Http {
            table: table.to_string(),
            operation,
            source,
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::failed(
            table,
            operation,
            format!("http status {}: {}", status.as_u16(), body.trim()),
        ))
    }

    async fn json_rows(
        &self,
        table: &str,
        operation: Operation,
        response: Response,
    ) -> Result<Vec<JsonValue>, RemoteError> {
        let bytes = response.bytes().await.map_err(|source| RemoteError::Http {
            table: table.to_string(),
            operation,
            source,
        })?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| RemoteError::Decode {
            table: table.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<JsonValue>, RemoteError> {
        let params = select_params(query)?;
        let request = self.client.get(self.table_url(table)).query(&params);
        let response = self.send(table, Operation::Select, request).await?;
        self.json_rows(table, Operation::Select, response).await
    }

    async fn insert(&self, table: &str, rows: &[JsonValue]) -> Result<Vec<JsonValue>, RemoteError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(rows);
        let response = self.send(table, Operation::Insert, request).await?;
        self.json_rows(table, Operation::Insert, response).await
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &JsonValue,
    ) -> Result<usize, RemoteError> {
        let request = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(patch);
        let response = self.send(table, Operation::Update, request).await?;
        Ok(self.json_rows(table, Operation::Update, response).await?.len())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let request = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filters))
            .header("Prefer", "return=representation");
        let response = self.send(table, Operation::Delete, request).await?;
        Ok(self.json_rows(table, Operation::Delete, response).await?.len())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let mut params = vec![("select".to_string(), "id".to_string())];
        params.extend(filter_params(filters));
        let request = self
            .client
            .head(self.table_url(table))
            .query(&params)
            .header("Prefer", "count=exact");
        let response = self.send(table, Operation::Count, request).await?;
        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| RemoteError::failed(table, Operation::Count, "missing Content-Range total"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn select_params_carry_order_range_and_filters() {
        let query = SelectQuery::new("id, name, assigned_to")
            .filter(Filter::eq("status", "not_started"))
            .order_by("name")
            .range(2000, 1000);
        let params = select_params(&query).expect("params");
        assert_eq!(param(&params, "select"), Some("id,name,assigned_to"));
        assert_eq!(param(&params, "order"), Some("name.asc"));
        assert_eq!(param(&params, "offset"), Some("2000"));
        assert_eq!(param(&params, "limit"), Some("1000"));
        assert_eq!(param(&params, "status"), Some("eq.not_started"));
    }

    #[test]
    fn select_params_refuse_oversized_ranges() {
        let query = SelectQuery::new("id").range(0, 3000);
        assert!(matches!(
            select_params(&query),
            Err(RemoteError::RangeTooLarge { requested: 3000 })
        ));
    }

    #[test]
    fn in_lists_quote_reserved_characters() {
        let params = filter_params(&[
            Filter::in_list("id", [1, 2, 3]),
            Filter::in_list("name", [json!("Acme, Inc."), json!("Beta")]),
            Filter::eq("assigned_to", JsonValue::Null),
            Filter::contains("name", "1440 Park"),
        ]);
        assert_eq!(params[0].1, "in.(1,2,3)");
        assert_eq!(params[1].1, "in.(\"Acme, Inc.\",Beta)");
        assert_eq!(params[2].1, "is.null");
        assert_eq!(params[3].1, "ilike.*1440 Park*");
    }

    #[test]
    fn content_range_total_is_parsed() {
        assert_eq!(parse_content_range("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-24/*"), None);
    }

    #[test]
    fn table_urls_ignore_trailing_slash() {
        let store = RestStore::new(StoreConfig {
            base_url: "https://example.supabase.co/".into(),
            api_key: "anon".into(),
            timeout: Duration::from_secs(5),
            user_agent: None,
        })
        .expect("client");
        assert_eq!(store.table_url("companies"), "https://example.supabase.co/rest/v1/companies");
    }
}
