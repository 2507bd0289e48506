//! In-process store with the same row cap as the hosted one.
//!
//! Used for dry runs and tests: it records every request per table and can be
//! told to fail the n-th call of an operation.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Mutex;

use crate::{Filter, Operation, RemoteError, RemoteStore, SelectQuery, MAX_ROWS_PER_REQUEST};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    pub table: String,
    pub operation: Operation,
    pub rows: usize,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, Vec<JsonValue>>,
    next_id: i64,
    requests: Vec<RequestRecord>,
    calls: HashMap<(String, Operation), usize>,
    failures: Vec<(String, Operation, usize)>,
}

impl MemoryState {
    /// Bump the call counter and report whether this call was scheduled to fail.
    fn begin(&mut self, table: &str, operation: Operation) -> Result<(), RemoteError> {
        let counter = self.calls.entry((table.to_string(), operation)).or_default();
        *counter += 1;
        let nth = *counter;
        if self
            .failures
            .iter()
            .any(|(t, op, n)| t == table && *op == operation && *n == nth)
        {
            return Err(RemoteError::failed(table, operation, "injected failure"));
        }
        Ok(())
    }

    fn record(&mut self, table: &str, operation: Operation, rows: usize) {
        self.requests.push(RequestRecord {
            table: table.to_string(),
            operation,
            rows,
        });
    }

    fn assign_id(&mut self, row: JsonValue) -> JsonValue {
        let mut object = match row {
            JsonValue::Object(object) => object,
            other => {
                let mut object = Map::new();
                object.insert("value".into(), other);
                object
            }
        };
        match object.get("id").and_then(JsonValue::as_i64) {
            Some(id) => self.next_id = self.next_id.max(id),
            None => {
                self.next_id += 1;
                object.insert("id".into(), JsonValue::from(self.next_id));
            }
        }
        JsonValue::Object(object)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rows without recording a request. Rows lacking an `id` get the next free one.
    pub async fn seed(&self, table: &str, rows: Vec<JsonValue>) {
        let mut state = self.state.lock().await;
        let rows: Vec<JsonValue> = rows.into_iter().map(|row| state.assign_id(row)).collect();
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    pub async fn rows(&self, table: &str) -> Vec<JsonValue> {
        let state = self.state.lock().await;
        state.tables.get(table).cloned().unwrap_or_default()
    }

    /// Schedule the `nth` (1-based) call of `operation` on `table` to fail.
    pub async fn fail_on(&self, table: &str, operation: Operation, nth: usize) {
        let mut state = self.state.lock().await;
        state.failures.push((table.to_string(), operation, nth));
    }

    pub async fn requests(&self) -> Vec<RequestRecord> {
        self.state.lock().await.requests.clone()
    }

    pub async fn request_count(&self, table: &str, operation: Operation) -> usize {
        let state = self.state.lock().await;
        state
            .calls
            .get(&(table.to_string(), operation))
            .copied()
            .unwrap_or_default()
    }

    pub async fn largest_select(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state
            .requests
            .iter()
            .filter(|r| r.table == table && r.operation == Operation::Select)
            .map(|r| r.rows)
            .max()
            .unwrap_or_default()
    }
}

fn row_matches(row: &JsonValue, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => row.get(column) == Some(value),
        Filter::Neq(column, value) => row.get(column) != Some(value),
        Filter::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
        Filter::Contains(column, needle) => row
            .get(column)
            .and_then(JsonValue::as_str)
            .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase())),
    })
}

fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(x)), Some(JsonValue::String(y))) => x.cmp(y),
        (None | Some(JsonValue::Null), None | Some(JsonValue::Null)) => Ordering::Equal,
        (None | Some(JsonValue::Null), _) => Ordering::Less,
        (_, None | Some(JsonValue::Null)) => Ordering::Greater,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn project(row: &JsonValue, columns: &str) -> JsonValue {
    let columns = columns.trim();
    if columns == "*" {
        return row.clone();
    }
    let mut object = Map::new();
    for column in columns.split(',').map(str::trim).filter(|c| !c.is_empty()) {
        if let Some(value) = row.get(column) {
            object.insert(column.to_string(), value.clone());
        }
    }
    JsonValue::Object(object)
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn select(&self, table: &str, query: &SelectQuery) -> Result<Vec<JsonValue>, RemoteError> {
        let mut state = self.state.lock().await;
        state.begin(table, Operation::Select)?;
        let limit = match query.range {
            Some(range) if range.limit > MAX_ROWS_PER_REQUEST => {
                return Err(RemoteError::RangeTooLarge {
                    requested: range.limit,
                })
            }
            Some(range) => range.limit,
            None => MAX_ROWS_PER_REQUEST,
        };
        let offset = query.range.map(|r| r.offset).unwrap_or_default();

        let mut matched: Vec<&JsonValue> = state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| row_matches(row, &query.filters)).collect())
            .unwrap_or_default();
        if let Some(order) = &query.order {
            matched.sort_by(|a, b| compare_values(a.get(order), b.get(order)));
        }
        let page: Vec<JsonValue> = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(row, &query.columns))
            .collect();
        state.record(table, Operation::Select, page.len());
        Ok(page)
    }

    async fn insert(&self, table: &str, rows: &[JsonValue]) -> Result<Vec<JsonValue>, RemoteError> {
        let mut state = self.state.lock().await;
        state.begin(table, Operation::Insert)?;
        let inserted: Vec<JsonValue> = rows.iter().map(|row| state.assign_id(row.clone())).collect();
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(inserted.iter().cloned());
        state.record(table, Operation::Insert, inserted.len());
        Ok(inserted)
    }

    async fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: &JsonValue,
    ) -> Result<usize, RemoteError> {
        let mut state = self.state.lock().await;
        state.begin(table, Operation::Update)?;
        let Some(fields) = patch.as_object() else {
            return Err(RemoteError::failed(table, Operation::Update, "patch must be an object"));
        };
        let mut updated = 0usize;
        if let Some(rows) = state.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| row_matches(row, filters)) {
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in fields {
                        object.insert(key.clone(), value.clone());
                    }
                    updated += 1;
                }
            }
        }
        state.record(table, Operation::Update, updated);
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let mut state = self.state.lock().await;
        state.begin(table, Operation::Delete)?;
        let mut deleted = 0usize;
        if let Some(rows) = state.tables.get_mut(table) {
            let before = rows.len();
            rows.retain(|row| !row_matches(row, filters));
            deleted = before - rows.len();
        }
        state.record(table, Operation::Delete, deleted);
        Ok(deleted)
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<usize, RemoteError> {
        let mut state = self.state.lock().await;
        state.begin(table, Operation::Count)?;
        let count = state
            .tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| row_matches(row, filters)).count())
            .unwrap_or_default();
        state.record(table, Operation::Count, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn select_applies_filters_order_and_projection() {
        let store = MemoryStore::new();
        store
            .seed(
                "companies",
                vec![
                    json!({"name": "Beta LLC", "assigned_to": "Sam"}),
                    json!({"name": "Acme Inc", "assigned_to": "Sam"}),
                    json!({"name": "1440 Park Apt., Inc.", "assigned_to": null}),
                ],
            )
            .await;

        let rows = store
            .select(
                "companies",
                &SelectQuery::new("id, name")
                    .filter(Filter::eq("assigned_to", "Sam"))
                    .order_by("name"),
            )
            .await
            .expect("select");
        assert_eq!(rows, vec![json!({"id": 2, "name": "Acme Inc"}), json!({"id": 1, "name": "Beta LLC"})]);

        let park = store
            .select("companies", &SelectQuery::new("name").filter(Filter::contains("name", "1440 PARK")))
            .await
            .expect("select");
        assert_eq!(park.len(), 1);
    }

    #[tokio::test]
    async fn oversized_range_is_refused() {
        let store = MemoryStore::new();
        let err = store
            .select("companies", &SelectQuery::new("*").range(0, 1001))
            .await
            .expect_err("cap");
        assert!(matches!(err, RemoteError::RangeTooLarge { requested: 1001 }));
    }

    #[tokio::test]
    async fn unranged_select_is_silently_capped() {
        let store = MemoryStore::new();
        store
            .seed("contacts", (0..1200).map(|i| json!({"company_id": i})).collect())
            .await;
        let rows = store.select("contacts", &SelectQuery::new("id")).await.expect("select");
        assert_eq!(rows.len(), MAX_ROWS_PER_REQUEST);
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_update_patches_matches() {
        let store = MemoryStore::new();
        let inserted = store
            .insert("companies", &[json!({"name": "Acme Inc"}), json!({"name": "Beta LLC"})])
            .await
            .expect("insert");
        assert_eq!(inserted[0]["id"], 1);
        assert_eq!(inserted[1]["id"], 2);

        let updated = store
            .update("companies", &[Filter::eq("id", 2)], &json!({"assigned_to": "Alex"}))
            .await
            .expect("update");
        assert_eq!(updated, 1);
        assert_eq!(store.rows("companies").await[1]["assigned_to"], "Alex");
        assert_eq!(store.count("companies", &[Filter::neq("id", 0)]).await.expect("count"), 2);
    }
}
