//! Applies plans against the store in bounded batches and verifies the result.
//!
//! Failed batches are recorded and skipped; no retries happen here.

use std::collections::BTreeMap;

use roster_core::{RecordId, COMPANIES_TABLE, CONTACTS_TABLE};
use roster_storage::{
    BatchOutcome, BatchWriter, Filter, Paginator, RemoteError, RemoteStore, SelectQuery, DEFAULT_BATCH_SIZE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use crate::assign::AssignmentUpdate;
use crate::deletion::ConfirmedDeletion;
use crate::restore::RestorePlan;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub table: String,
    pub batch_index: usize,
    pub records: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verification {
    pub label: String,
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub operation: String,
    pub succeeded: BTreeMap<String, usize>,
    pub failed_batches: Vec<BatchFailure>,
    /// Records never attempted because the batch they depended on failed.
    pub skipped_records: usize,
    pub verification: Vec<Verification>,
}

impl ExecutionResult {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            ..Self::default()
        }
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded.values().sum()
    }

    pub fn succeeded_in(&self, table: &str) -> usize {
        self.succeeded.get(table).copied().unwrap_or_default()
    }

    pub fn is_clean(&self) -> bool {
        self.failed_batches.is_empty() && self.skipped_records == 0
    }

    fn add_success(&mut self, table: &str, records: usize) {
        *self.succeeded.entry(table.to_string()).or_default() += records;
    }

    fn add_failure(&mut self, table: &str, batch_index: usize, records: usize, error: String) {
        self.failed_batches.push(BatchFailure {
            table: table.to_string(),
            batch_index,
            records,
            error,
        });
    }

    fn absorb(&mut self, table: &str, outcomes: &[BatchOutcome], index_offset: usize) {
        for outcome in outcomes {
            match &outcome.error {
                None => self.add_success(table, outcome.affected),
                Some(err) => self.add_failure(
                    table,
                    index_offset + outcome.batch_index,
                    outcome.attempted,
                    err.clone(),
                ),
            }
        }
    }

    fn verify(&mut self, label: impl Into<String>, count: Result<usize, RemoteError>) {
        let label = label.into();
        match count {
            Ok(count) => {
                info!(label = %label, count, "verification");
                self.verification.push(Verification {
                    label,
                    count: Some(count),
                    error: None,
                });
            }
            Err(err) => {
                warn!(label = %label, error = %err, "verification failed");
                self.verification.push(Verification {
                    label,
                    count: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("=== {} ===", self.operation.to_uppercase()));
        for (table, count) in &self.succeeded {
            lines.push(format!("{table}: {count} records succeeded"));
        }
        if self.failed_batches.is_empty() {
            lines.push("No failed batches".to_string());
        } else {
            lines.push(format!("Failed batches: {}", self.failed_batches.len()));
            for failure in &self.failed_batches {
                lines.push(format!(
                    "  - {} batch {} ({} records): {}",
                    failure.table, failure.batch_index, failure.records, failure.error
                ));
            }
        }
        if self.skipped_records > 0 {
            lines.push(format!("Skipped dependent records: {}", self.skipped_records));
        }
        for check in &self.verification {
            match (check.count, &check.error) {
                (Some(count), _) => {
                    lines.push(format!("Verified {}: {count}", check.label));
                }
                (None, Some(err)) => {
                    lines.push(format!("Could not verify {}: {err}", check.label));
                }
                (None, None) => {}
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: RecordId,
}

#[derive(Debug, Deserialize)]
struct AssignedRow {
    id: RecordId,
    #[serde(default)]
    assigned_to: Option<String>,
}

pub struct BatchExecutor<'a> {
    store: &'a dyn RemoteStore,
    batch_size: usize,
    page_size: usize,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            page_size: roster_storage::MAX_ROWS_PER_REQUEST,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, DEFAULT_BATCH_SIZE);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn writer(&self) -> BatchWriter<'a> {
        BatchWriter::new(self.store).with_batch_size(self.batch_size)
    }

    fn paginator(&self) -> Paginator<'a> {
        Paginator::new(self.store).with_page_size(self.page_size)
    }

    /// Companies go first, batch by batch; each batch's contacts follow once
    /// the store has handed back the new company ids.
    pub async fn execute_restore(&self, plan: &RestorePlan, operation: &str) -> ExecutionResult {
        let mut result = ExecutionResult::new(operation);
        let total = plan.units.len();
        let mut done = 0usize;
        let mut contact_batches = 0usize;

        for (batch_index, units) in plan.units.chunks(self.batch_size).enumerate() {
            let contacts_in_batch: usize = units.iter().map(|u| u.contacts.len()).sum();
            let rows: Result<Vec<JsonValue>, _> =
                units.iter().map(|u| serde_json::to_value(&u.company)).collect();
            let rows = match rows {
                Ok(rows) => rows,
                Err(err) => {
                    result.add_failure(COMPANIES_TABLE, batch_index, units.len(), err.to_string());
                    result.skipped_records += contacts_in_batch;
                    continue;
                }
            };

            let returned = match self.store.insert(COMPANIES_TABLE, &rows).await {
                Ok(returned) => returned,
                Err(err) => {
                    error!(table = COMPANIES_TABLE, batch_index, error = %err, "insert batch failed");
                    result.add_failure(COMPANIES_TABLE, batch_index, units.len(), err.to_string());
                    result.skipped_records += contacts_in_batch;
                    continue;
                }
            };
            done += units.len();
            info!("Uploaded {done} / {total} {COMPANIES_TABLE}");

            let ids: Result<Vec<InsertedRow>, _> = returned
                .into_iter()
                .map(serde_json::from_value::<InsertedRow>)
                .collect();
            let ids = match ids {
                Ok(ids) if ids.len() == units.len() => ids,
                Ok(ids) => {
                    let landed = ids.len().min(units.len());
                    result.add_success(COMPANIES_TABLE, landed);
                    result.add_failure(
                        COMPANIES_TABLE,
                        batch_index,
                        units.len() - landed,
                        format!("store returned {} rows for {} inserted", ids.len(), units.len()),
                    );
                    result.skipped_records += contacts_in_batch;
                    continue;
                }
                Err(err) => {
                    result.add_failure(
                        COMPANIES_TABLE,
                        batch_index,
                        units.len(),
                        format!("inserted rows carry no usable id: {err}"),
                    );
                    result.skipped_records += contacts_in_batch;
                    continue;
                }
            };
            result.add_success(COMPANIES_TABLE, units.len());

            let contacts: Result<Vec<JsonValue>, _> = units
                .iter()
                .zip(&ids)
                .flat_map(|(unit, row)| {
                    unit.contacts
                        .iter()
                        .map(move |c| serde_json::to_value(c.clone().into_new_contact(row.id)))
                })
                .collect();
            match contacts {
                Ok(contacts) if !contacts.is_empty() => {
                    let outcomes = self.writer().insert_all(CONTACTS_TABLE, &contacts).await;
                    result.absorb(CONTACTS_TABLE, &outcomes, contact_batches);
                    contact_batches += outcomes.len();
                }
                Ok(_) => {}
                Err(err) => {
                    result.add_failure(CONTACTS_TABLE, contact_batches, contacts_in_batch, err.to_string());
                    contact_batches += 1;
                }
            }
        }

        result.verify(
            format!("{COMPANIES_TABLE} count"),
            self.store.count(COMPANIES_TABLE, &[]).await,
        );
        result.verify(
            format!("{CONTACTS_TABLE} count"),
            self.store.count(CONTACTS_TABLE, &[]).await,
        );
        result
    }

    pub async fn insert_contacts<T: Serialize>(&self, contacts: &[T]) -> ExecutionResult {
        let mut result = ExecutionResult::new("import-contacts");
        let rows: Result<Vec<JsonValue>, _> = contacts.iter().map(serde_json::to_value).collect();
        match rows {
            Ok(rows) => {
                let outcomes = self.writer().insert_all(CONTACTS_TABLE, &rows).await;
                result.absorb(CONTACTS_TABLE, &outcomes, 0);
            }
            Err(err) => result.add_failure(CONTACTS_TABLE, 0, contacts.len(), err.to_string()),
        }
        result.verify(
            format!("{CONTACTS_TABLE} count"),
            self.store.count(CONTACTS_TABLE, &[]).await,
        );
        result
    }

    /// Verification re-fetches the planned ids; the expected count is zero.
    pub async fn execute_deletion(&self, confirmed: ConfirmedDeletion) -> ExecutionResult {
        let mut result = ExecutionResult::new("cleanup-orphans");
        let plan = confirmed.plan();
        let outcomes = self
            .writer()
            .delete_batches(COMPANIES_TABLE, &plan.batches)
            .await;
        result.absorb(COMPANIES_TABLE, &outcomes, 0);

        let remaining: Result<Vec<InsertedRow>, _> = self
            .paginator()
            .fetch_in_chunks(
                COMPANIES_TABLE,
                &SelectQuery::new("id"),
                "id",
                &plan.ids(),
                self.batch_size,
            )
            .await;
        result.verify("planned companies still present", remaining.map(|rows| rows.len()));
        result
    }

    /// One update per company. Verification counts rows now carrying the new caller.
    pub async fn execute_assignments(&self, updates: &[AssignmentUpdate]) -> ExecutionResult {
        let mut result = ExecutionResult::new("assign-callers");
        for (index, update) in updates.iter().enumerate() {
            let filters = [Filter::eq("id", update.company_id)];
            match self.store.update(COMPANIES_TABLE, &filters, &update.patch()).await {
                Ok(affected) => {
                    info!("Updated {} -> assigned to {}", update.company, update.assigned_to);
                    result.add_success(COMPANIES_TABLE, affected);
                }
                Err(err) => {
                    error!(company = %update.company, error = %err, "assignment update failed");
                    result.add_failure(COMPANIES_TABLE, index, 1, err.to_string());
                }
            }
        }

        let ids: Vec<RecordId> = updates.iter().map(|u| u.company_id).collect();
        let rows: Result<Vec<AssignedRow>, _> = self
            .paginator()
            .fetch_in_chunks(
                COMPANIES_TABLE,
                &SelectQuery::new("id, assigned_to"),
                "id",
                &ids,
                self.batch_size,
            )
            .await;
        let applied = rows.map(|rows| {
            rows.iter()
                .filter(|row| {
                    updates.iter().any(|u| {
                        u.company_id == row.id && row.assigned_to.as_deref() == Some(u.assigned_to.as_str())
                    })
                })
                .count()
        });
        result.verify("companies carrying the source caller", applied);
        result
    }
}
