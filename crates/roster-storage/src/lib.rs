//! Remote collection access for the roster: query model, store trait,
//! range-capped pagination and batched writes.

use std::fmt;

use async_trait::async_trait;
use roster_core::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info};

pub mod memory;
pub mod rest;

pub use memory::MemoryStore;
pub use rest::{RestStore, StoreConfig};

pub const CRATE_NAME: &str = "roster-storage";

/// Hard cap the store applies to any single select.
pub const MAX_ROWS_PER_REQUEST: usize = 1000;
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Count,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Select => "select",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Count => "count",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{operation} on {table} failed: {message}")]
    RequestFailed {
        table: String,
        operation: Operation,
        message: String,
    },
    #[error("{operation} on {table}: {source}")]
    Http {
        table: String,
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("decoding {table} rows: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("range of {requested} rows exceeds the {MAX_ROWS_PER_REQUEST}-row cap")]
    RangeTooLarge { requested: usize },
}

impl RemoteError {
    pub fn failed(table: &str, operation: Operation, message: impl Into<String>) -> Self {
        Self::RequestFailed {
            table: table.to_string(),
            operation,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, JsonValue),
    Neq(String, JsonValue),
    In(String, Vec<JsonValue>),
    Contains(String, String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<JsonValue>) -> Self {
        Self::Eq(column.to_string(), value.into())
    }

    pub fn neq(column: &str, value: impl Into<JsonValue>) -> Self {
        Self::Neq(column.to_string(), value.into())
    }

    pub fn in_list<V: Into<JsonValue>>(column: &str, values: impl IntoIterator<Item = V>) -> Self {
        Self::In(column.to_string(), values.into_iter().map(Into::into).collect())
    }

    pub fn contains(column: &str, needle: &str) -> Self {
        Self::Contains(column.to_string(), needle.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<String>,
    pub range: Option<RowRange>,
}

impl Default for SelectQuery {
    fn default() -> Self {
        Self::new("*")
    }
}

impl SelectQuery {
    pub fn new(columns: &str) -> Self {
        Self {
            columns: columns.to_string(),
            filters: Vec::new(),
            order: None,
            range: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order = Some(column.to_string());
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.range = Some(RowRange { offset, limit });
        self
    }
}

/// The remote collection API. Implementations must not retry on their own.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<JsonValue>, RemoteError>;

    /// Returns the inserted rows with their assigned ids, in input order.
    async fn insert(&self, table: &str, rows: &[JsonValue]) -> Result<Vec<JsonValue>, RemoteError>;

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &JsonValue,
    ) -> Result<usize, RemoteError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub pages: usize,
    pub rows: usize,
}

/// Reads whole collections through range requests no larger than `page_size`.
///
/// A page shorter than `page_size` (including an empty one) ends the scan.
/// Rows inserted behind the cursor while scanning are not guarded against.
pub struct Paginator<'a> {
    store: &'a dyn RemoteStore,
    page_size: usize,
}

impl<'a> Paginator<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            page_size: MAX_ROWS_PER_REQUEST,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.clamp(1, MAX_ROWS_PER_REQUEST);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Append every matching row to `buf`. Without an explicit order the scan is ordered by `id`.
    pub async fn fetch_into<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &SelectQuery,
        buf: &mut Vec<T>,
    ) -> Result<FetchStats, RemoteError> {
        let mut base = query.clone();
        if base.order.is_none() {
            base.order = Some("id".to_string());
        }

        let mut stats = FetchStats::default();
        let mut offset = 0usize;
        loop {
            let page = self
                .store
                .select(table, &base.clone().range(offset, self.page_size))
                .await?;
            stats.pages += 1;
            let page_len = page.len();
            for row in page {
                let decoded = serde_json::from_value(row).map_err(|source| RemoteError::Decode {
                    table: table.to_string(),
                    source,
                })?;
                buf.push(decoded);
            }
            stats.rows += page_len;
            debug!(table, offset, page_len, "fetched page");
            if page_len < self.page_size {
                break;
            }
            offset += self.page_size;
        }
        Ok(stats)
    }

    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &SelectQuery,
    ) -> Result<Vec<T>, RemoteError> {
        let mut rows = Vec::new();
        let stats = self.fetch_into(table, query, &mut rows).await?;
        info!(table, rows = stats.rows, pages = stats.pages, "fetched collection");
        Ok(rows)
    }

    /// Paginated `column IN (ids)` lookup, split so no filter list exceeds `chunk_size` ids.
    pub async fn fetch_in_chunks<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &SelectQuery,
        column: &str,
        ids: &[RecordId],
        chunk_size: usize,
    ) -> Result<Vec<T>, RemoteError> {
        let mut rows = Vec::new();
        for chunk in ids.chunks(chunk_size.max(1)) {
            let scoped = query.clone().filter(Filter::in_list(column, chunk.iter().copied()));
            self.fetch_into(table, &scoped, &mut rows).await?;
        }
        Ok(rows)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub batch_index: usize,
    pub attempted: usize,
    pub affected: usize,
    pub error: Option<String>,
    #[serde(skip)]
    pub returned: Vec<JsonValue>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    fn ok(batch_index: usize, attempted: usize, affected: usize, returned: Vec<JsonValue>) -> Self {
        Self {
            batch_index,
            attempted,
            affected,
            error: None,
            returned,
        }
    }

    fn failed(batch_index: usize, attempted: usize, err: &RemoteError) -> Self {
        Self {
            batch_index,
            attempted,
            affected: 0,
            error: Some(err.to_string()),
            returned: Vec::new(),
        }
    }
}

/// Fixed-size batched writes. A failing batch is logged and recorded, then the next one runs.
pub struct BatchWriter<'a> {
    store: &'a dyn RemoteStore,
    batch_size: usize,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, DEFAULT_BATCH_SIZE);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn insert_all(&self, table: &str, rows: &[JsonValue]) -> Vec<BatchOutcome> {
        let total = rows.len();
        let mut done = 0usize;
        let mut outcomes = Vec::new();
        for (batch_index, batch) in rows.chunks(self.batch_size).enumerate() {
            let outcome = match self.store.insert(table, batch).await {
                Ok(returned) => {
                    done += batch.len();
                    info!("Uploaded {done} / {total} {table}");
                    BatchOutcome::ok(batch_index, batch.len(), returned.len(), returned)
                }
                Err(err) => {
                    error!(table, batch_index, error = %err, "insert batch failed");
                    BatchOutcome::failed(batch_index, batch.len(), &err)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    pub async fn delete_ids(&self, table: &str, ids: &[RecordId]) -> Vec<BatchOutcome> {
        let batches: Vec<Vec<RecordId>> = ids.chunks(self.batch_size).map(<[RecordId]>::to_vec).collect();
        self.delete_batches(table, &batches).await
    }

    pub async fn delete_batches(&self, table: &str, batches: &[Vec<RecordId>]) -> Vec<BatchOutcome> {
        let total: usize = batches.iter().map(Vec::len).sum();
        let mut done = 0usize;
        let mut outcomes = Vec::new();
        for (batch_index, batch) in batches.iter().enumerate() {
            let filter = [Filter::in_list("id", batch.iter().copied())];
            let outcome = match self.store.delete(table, &filter).await {
                Ok(affected) => {
                    done += batch.len();
                    info!("Deleted {done} / {total} {table}");
                    BatchOutcome::ok(batch_index, batch.len(), affected, Vec::new())
                }
                Err(err) => {
                    error!(table, batch_index, error = %err, "delete batch failed");
                    BatchOutcome::failed(batch_index, batch.len(), &err)
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}
