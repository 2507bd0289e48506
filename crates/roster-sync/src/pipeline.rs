//! Orchestration: loads sources, reads the remote collections and hands
//! both to the planners and the executor.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use roster_adapters::{load_source, HeaderAmbiguity, SourceDataset};
use roster_core::{Company, CompanyDraft, CompanyKey, Contact, ContactDraft, DependentRef, COMPANIES_TABLE, CONTACTS_TABLE};
use roster_storage::{Filter, Paginator, RemoteStore, RestStore, SelectQuery, StoreConfig};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assign::{plan_assignment_updates, AssignmentUpdate};
use crate::deletion::{plan_deletion, ConfirmedDeletion, DeletionOutcome, OrphanSummary, StoreDependents};
use crate::execute::{BatchExecutor, ExecutionResult};
use crate::reconcile::{compare_assignments, duplicate_keys, reconcile, KeySet, ReconciliationReport};
use crate::restore::{self, ContactBackfillPlan, RestorePlan, RestorePolicy};
use crate::{write_run_report, RunRecord, SourceRegistry, SyncConfig};

pub const TARGET_NAME: &str = "database";

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub source_id: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct LoadedSources {
    pub datasets: Vec<SourceDataset>,
    pub failures: Vec<SourceFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub source_id: String,
    pub rows_read: usize,
    pub companies: usize,
    pub contacts: usize,
    pub callers: usize,
    pub duplicate_company_rows: usize,
    pub caller_conflicts: usize,
    pub row_errors: usize,
    pub header_ambiguities: Vec<HeaderAmbiguity>,
}

impl From<&SourceDataset> for DatasetSummary {
    fn from(dataset: &SourceDataset) -> Self {
        Self {
            source_id: dataset.source_id.clone(),
            rows_read: dataset.rows_read,
            companies: dataset.companies.len(),
            contacts: dataset.contacts.len(),
            callers: dataset.caller_assignments.len(),
            duplicate_company_rows: dataset.duplicate_company_rows,
            caller_conflicts: dataset.caller_conflicts,
            row_errors: dataset.row_errors.len(),
            header_ambiguities: dataset.header_ambiguities.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub sources: Vec<DatasetSummary>,
    pub source_failures: Vec<SourceFailure>,
    pub report: ReconciliationReport,
}

impl Analysis {
    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push("=== SOURCES ===".to_string());
        for source in &self.sources {
            lines.push(format!(
                "{}: {} rows, {} companies, {} contacts, {} callers",
                source.source_id, source.rows_read, source.companies, source.contacts, source.callers
            ));
            if source.row_errors > 0 {
                lines.push(format!("  {} unreadable rows skipped", source.row_errors));
            }
            if source.caller_conflicts > 0 {
                lines.push(format!("  {} rows named a different caller than the first", source.caller_conflicts));
            }
            for ambiguity in &source.header_ambiguities {
                lines.push(format!(
                    "  column {} matched {:?}, using {}",
                    ambiguity.column, ambiguity.candidates, ambiguity.chosen
                ));
            }
        }
        for failure in &self.source_failures {
            lines.push(format!("{}: UNAVAILABLE ({})", failure.source_id, failure.error));
        }
        lines.push(String::new());
        lines.push(self.report.render(cap));
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountCheck {
    pub exact: usize,
    pub fetched: usize,
    pub first: Option<Company>,
    pub last: Option<Company>,
}

impl CountCheck {
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Exact count: {}", self.exact));
        lines.push(format!("Fetched with pagination: {}", self.fetched));
        if self.exact != self.fetched {
            lines.push(format!("MISMATCH: pagination returned {} rows", self.fetched));
        }
        if let Some(first) = &self.first {
            lines.push(format!("First: {} (id {})", first.name, first.id));
        }
        if let Some(last) = &self.last {
            lines.push(format!("Last: {} (id {})", last.name, last.id));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectedCompany {
    pub company: Company,
    pub contacts: Vec<Contact>,
}

pub fn render_inspection(pattern: &str, matches: &[InspectedCompany]) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Companies matching \"{pattern}\": {}", matches.len()));
    for found in matches {
        let company = &found.company;
        lines.push(format!("\n{} (id {})", company.name, company.id));
        lines.push(format!(
            "  assigned to: {}",
            company.assigned_to.as_deref().unwrap_or("unassigned")
        ));
        if let Some(status) = company.status {
            lines.push(format!("  status: {}", status.as_str()));
        }
        lines.push(format!("  contacts: {}", found.contacts.len()));
        for contact in &found.contacts {
            lines.push(format!(
                "    - {} | {} | {}",
                contact.name,
                contact.title.as_deref().unwrap_or("-"),
                contact.phone.as_deref().unwrap_or("-")
            ));
        }
    }
    lines.join("\n")
}

pub struct Pipeline {
    config: SyncConfig,
    registry: SourceRegistry,
    store: Arc<dyn RemoteStore>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(config: SyncConfig, registry: SourceRegistry, store: Arc<dyn RemoteStore>) -> Self {
        Self {
            config,
            registry,
            store,
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    /// Builds the REST-backed pipeline. A missing registry file only matters to
    /// commands that read sources.
    pub async fn from_env() -> Result<Self> {
        let config = SyncConfig::from_env();
        let registry = if config.sources_path.exists() {
            SourceRegistry::load(&config.sources_path).await?
        } else {
            warn!(path = %config.sources_path.display(), "source registry not found");
            SourceRegistry { sources: Vec::new() }
        };
        let store = RestStore::new(StoreConfig::from_env()?)?;
        Ok(Self::new(config, registry, Arc::new(store)))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn paginator(&self) -> Paginator<'_> {
        Paginator::new(self.store.as_ref()).with_page_size(self.config.page_size)
    }

    fn executor(&self) -> BatchExecutor<'_> {
        BatchExecutor::new(self.store.as_ref())
            .with_batch_size(self.config.batch_size)
            .with_page_size(self.config.page_size)
    }

    pub fn load_source(&self, source_id: &str) -> Result<SourceDataset> {
        let source = self.registry.get(source_id)?;
        load_source(&source.source_id, source.kind, &source.path)
            .with_context(|| format!("loading source `{}` ({})", source.source_id, source.display_name))
    }

    /// An unreadable source is recorded and the rest still load. No ids means every enabled source.
    pub fn load_sources(&self, source_ids: &[String]) -> LoadedSources {
        let ids: Vec<String> = if source_ids.is_empty() {
            self.registry.enabled().map(|s| s.source_id.clone()).collect()
        } else {
            source_ids.to_vec()
        };

        let mut loaded = LoadedSources::default();
        for source_id in ids {
            match self.load_source(&source_id) {
                Ok(dataset) => loaded.datasets.push(dataset),
                Err(err) => {
                    warn!(source_id = %source_id, error = %format!("{err:#}"), "source skipped");
                    loaded.failures.push(SourceFailure {
                        source_id,
                        error: format!("{err:#}"),
                    });
                }
            }
        }
        loaded
    }

    fn load_required(&self, source_ids: &[String]) -> Result<LoadedSources> {
        let loaded = self.load_sources(source_ids);
        if let Some(failure) = loaded.failures.first() {
            bail!("source `{}` is unavailable: {}", failure.source_id, failure.error);
        }
        if loaded.datasets.is_empty() {
            bail!("no sources selected and none enabled in the registry");
        }
        Ok(loaded)
    }

    pub async fn fetch_companies(&self) -> Result<Vec<Company>> {
        self.paginator()
            .fetch_all(COMPANIES_TABLE, &SelectQuery::new("*"))
            .await
            .context("fetching companies")
    }

    pub async fn fetch_contact_links(&self) -> Result<Vec<DependentRef>> {
        self.paginator()
            .fetch_all(CONTACTS_TABLE, &SelectQuery::new("id, company_id"))
            .await
            .context("fetching contact links")
    }

    async fn remote_keys(&self) -> Result<BTreeSet<CompanyKey>> {
        Ok(self.fetch_companies().await?.iter().map(Company::key).collect())
    }

    pub async fn analyze(&self, source_ids: &[String]) -> Result<Analysis> {
        let loaded = self.load_sources(source_ids);
        if loaded.datasets.is_empty() {
            bail!("no source could be read");
        }

        let companies = self.fetch_companies().await?;
        let target = KeySet::from_names(TARGET_NAME, companies.iter().map(|c| c.name.as_str()));
        let sets: Vec<KeySet> = loaded
            .datasets
            .iter()
            .map(|d| KeySet::from_labels(d.source_id.clone(), d.company_labels()))
            .collect();

        let mut report = reconcile(&sets, &target);
        report.duplicates_in_target = duplicate_keys(&companies);
        report.assignment_conflicts = compare_assignments(&merged_callers(&loaded.datasets), &companies);
        info!(
            missing = report.missing_total(),
            extra = report.extra_in_target.len(),
            conflicts = report.assignment_conflicts.len(),
            "reconciliation complete"
        );

        Ok(Analysis {
            sources: loaded.datasets.iter().map(DatasetSummary::from).collect(),
            source_failures: loaded.failures,
            report,
        })
    }

    /// Companies come from `company_sources` (first spelling wins across
    /// sources), contacts from `contact_sources`.
    pub async fn plan_restore(
        &self,
        company_sources: &[String],
        contact_sources: &[String],
        policy: RestorePolicy,
    ) -> Result<RestorePlan> {
        let mut datasets: HashMap<String, SourceDataset> = HashMap::new();
        for id in company_sources.iter().chain(contact_sources) {
            if !datasets.contains_key(id) {
                datasets.insert(id.clone(), self.load_source(id)?);
            }
        }

        let companies: Vec<CompanyDraft> = company_sources
            .iter()
            .filter_map(|id| datasets.get(id))
            .flat_map(|d| d.companies.iter().cloned())
            .collect();
        let contacts: Vec<ContactDraft> = contact_sources
            .iter()
            .filter_map(|id| datasets.get(id))
            .flat_map(|d| d.contacts.iter().cloned())
            .collect();

        let existing = self.remote_keys().await?;
        let plan = restore::plan_restore(&companies, &contacts, &existing, policy);
        info!(
            companies = plan.company_count(),
            contacts = plan.contact_count(),
            skipped_existing = plan.skipped_existing,
            unresolved_contacts = plan.unresolved_contacts,
            "restore planned"
        );
        Ok(plan)
    }

    pub async fn execute_restore(&self, plan: &RestorePlan, operation: &str) -> ExecutionResult {
        self.executor().execute_restore(plan, operation).await
    }

    pub async fn plan_contact_backfill(&self, source_ids: &[String]) -> Result<ContactBackfillPlan> {
        let loaded = self.load_required(source_ids)?;
        let contacts: Vec<ContactDraft> = loaded
            .datasets
            .iter()
            .flat_map(|d| d.contacts.iter().cloned())
            .collect();
        let companies = self.fetch_companies().await?;
        let existing: Vec<Contact> = self
            .paginator()
            .fetch_all(CONTACTS_TABLE, &SelectQuery::new("id, company_id, name"))
            .await
            .context("fetching contacts")?;
        Ok(restore::plan_contact_backfill(&contacts, &companies, &existing))
    }

    pub async fn execute_contact_backfill(&self, plan: &ContactBackfillPlan) -> ExecutionResult {
        self.executor().insert_contacts(&plan.contacts).await
    }

    pub async fn plan_assignments(&self, source_ids: &[String]) -> Result<Vec<AssignmentUpdate>> {
        let loaded = self.load_required(source_ids)?;
        let companies = self.fetch_companies().await?;
        let conflicts = compare_assignments(&merged_callers(&loaded.datasets), &companies);
        Ok(plan_assignment_updates(&conflicts))
    }

    pub async fn execute_assignments(&self, updates: &[AssignmentUpdate]) -> ExecutionResult {
        self.executor().execute_assignments(updates).await
    }

    pub async fn orphan_summary(&self) -> Result<OrphanSummary> {
        let companies = self.fetch_companies().await?;
        let links = self.fetch_contact_links().await?;
        Ok(OrphanSummary::new(&companies, &links))
    }

    /// Orphans are planned for deletion only if nothing in calls or signups points at them.
    pub async fn plan_orphan_cleanup(&self) -> Result<DeletionOutcome> {
        let summary = self.orphan_summary().await?;
        let lookup = StoreDependents::new(self.store.as_ref(), self.config.page_size);
        plan_deletion(&summary.orphans, &lookup, self.config.batch_size)
            .await
            .context("checking dependent collections")
    }

    pub async fn execute_deletion(&self, confirmed: ConfirmedDeletion) -> ExecutionResult {
        self.executor().execute_deletion(confirmed).await
    }

    pub async fn count_check(&self) -> Result<CountCheck> {
        let exact = self
            .store
            .count(COMPANIES_TABLE, &[])
            .await
            .context("counting companies")?;
        let companies = self.fetch_companies().await?;
        Ok(CountCheck {
            exact,
            fetched: companies.len(),
            first: companies.iter().min_by_key(|c| c.id).cloned(),
            last: companies.iter().max_by_key(|c| c.id).cloned(),
        })
    }

    pub async fn inspect(&self, pattern: &str) -> Result<Vec<InspectedCompany>> {
        let companies: Vec<Company> = self
            .paginator()
            .fetch_all(
                COMPANIES_TABLE,
                &SelectQuery::new("*").filter(Filter::contains("name", pattern)),
            )
            .await
            .context("searching companies")?;
        let ids: Vec<_> = companies.iter().map(|c| c.id).collect();
        let contacts: Vec<Contact> = self
            .paginator()
            .fetch_in_chunks(CONTACTS_TABLE, &SelectQuery::new("*"), "company_id", &ids, self.config.batch_size)
            .await
            .context("fetching contacts for matches")?;

        let mut grouped: HashMap<_, Vec<Contact>> = HashMap::new();
        for contact in contacts {
            grouped.entry(contact.company_id).or_default().push(contact);
        }
        Ok(companies
            .into_iter()
            .map(|company| InspectedCompany {
                contacts: grouped.remove(&company.id).unwrap_or_default(),
                company,
            })
            .collect())
    }

    pub async fn write_report<T: Serialize>(
        &self,
        command: &str,
        dry_run: bool,
        payload: &T,
        summary: &str,
    ) -> Result<PathBuf> {
        let record = RunRecord {
            run_id: self.run_id,
            command: command.to_string(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            dry_run,
        };
        let dir = write_run_report(&self.config.reports_dir, &record, payload, summary).await?;
        info!(run_id = %self.run_id, dir = %dir.display(), "report written");
        Ok(dir)
    }
}

fn merged_callers(datasets: &[SourceDataset]) -> BTreeMap<CompanyKey, String> {
    let mut callers = BTreeMap::new();
    for dataset in datasets {
        for (key, caller) in &dataset.caller_assignments {
            callers.entry(key.clone()).or_insert_with(|| caller.clone());
        }
    }
    callers
}
