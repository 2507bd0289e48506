//! Reconciliation pipeline: set comparison, restore/import planning,
//! gated orphan deletion and batched execution against the remote store.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use roster_adapters::SourceKind;
use roster_storage::{DEFAULT_BATCH_SIZE, MAX_ROWS_PER_REQUEST};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

pub mod assign;
pub mod deletion;
pub mod execute;
pub mod pipeline;
pub mod reconcile;
pub mod restore;

pub use assign::{plan_assignment_updates, AssignmentUpdate};
pub use deletion::{
    find_orphans, plan_deletion, ConfirmError, ConfirmedDeletion, DeletionBlock, DeletionOutcome, DeletionPlan,
    DependentLookup, OrphanSummary, StoreDependents,
};
pub use execute::{BatchExecutor, BatchFailure, ExecutionResult, Verification};
pub use pipeline::{Analysis, CountCheck, InspectedCompany, LoadedSources, Pipeline, SourceFailure};
pub use reconcile::{compare_assignments, duplicate_keys, reconcile, KeySet, ReconciliationReport, LISTING_CAP};
pub use restore::{plan_contact_backfill, plan_restore, ContactBackfillPlan, RestorePlan, RestorePolicy};

pub const CRATE_NAME: &str = "roster-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub kind: SourceKind,
    pub path: PathBuf,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourceRegistry {
    /// Relative source paths are resolved against the registry file's directory.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut registry: Self =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        for source in &mut registry.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
        Ok(registry)
    }

    pub fn get(&self, source_id: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.source_id == source_id)
            .with_context(|| format!("unknown source `{source_id}` (see sources.yaml)"))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub sources_path: PathBuf,
    pub reports_dir: PathBuf,
    pub page_size: usize,
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sources_path: PathBuf::from("./sources.yaml"),
            reports_dir: PathBuf::from("./reports"),
            page_size: MAX_ROWS_PER_REQUEST,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sources_path: std::env::var("ROSTER_SOURCES")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_path),
            reports_dir: std::env::var("ROSTER_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.reports_dir),
            page_size: std::env::var("ROSTER_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.page_size)
                .clamp(1, MAX_ROWS_PER_REQUEST),
            batch_size: std::env::var("ROSTER_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(defaults.batch_size)
                .clamp(1, DEFAULT_BATCH_SIZE),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
}

/// Writes `<reports_dir>/<run_id>/<command>.json` and `summary.md`.
pub async fn write_run_report<T: Serialize>(
    reports_dir: &Path,
    record: &RunRecord,
    payload: &T,
    summary: &str,
) -> Result<PathBuf> {
    let run_dir = reports_dir.join(record.run_id.to_string());
    fs::create_dir_all(&run_dir)
        .await
        .with_context(|| format!("creating {}", run_dir.display()))?;

    let body = serde_json::to_vec_pretty(&serde_json::json!({
        "run": record,
        "result": payload,
    }))
    .with_context(|| format!("serializing {} report", record.command))?;
    let json_path = run_dir.join(format!("{}.json", record.command));
    fs::write(&json_path, body)
        .await
        .with_context(|| format!("writing {}", json_path.display()))?;

    let brief = format!(
        "# Roster Run\n\n- Run ID: `{}`\n- Command: {}\n- Dry run: {}\n- Started: {}\n- Finished: {}\n\n```text\n{}\n```\n",
        record.run_id,
        record.command,
        record.dry_run,
        record.started_at,
        record.finished_at,
        summary.trim_end()
    );
    fs::write(run_dir.join("summary.md"), brief)
        .await
        .context("writing summary.md")?;
    Ok(run_dir)
}

pub fn recent_reports_markdown(runs: usize, reports_dir: &Path) -> Result<String> {
    let mut dirs = std::fs::read_dir(reports_dir)
        .with_context(|| format!("reading {}", reports_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
        .collect::<Vec<_>>();
    dirs.sort_by_key(|e| e.metadata().and_then(|m| m.modified()).ok());
    dirs.reverse();

    let mut lines = vec!["# Roster Runs".to_string(), String::new()];
    for dir in dirs.into_iter().take(runs.max(1)) {
        let run_id = dir.file_name().to_string_lossy().to_string();
        let mut files = std::fs::read_dir(dir.path())
            .with_context(|| format!("reading {}", dir.path().display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        files.sort();

        lines.push(format!("## Run `{run_id}`"));
        for file in files {
            lines.push(format!("- `{}`", dir.path().join(file).display()));
        }
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_resolves_relative_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("sources.yaml");
        std::fs::write(
            &path,
            "sources:\n  - source_id: master\n    display_name: Master list\n    kind: master_list\n    path: data/master.csv\n  - source_id: grid\n    display_name: Companies\n    kind: companies_grid\n    path: /abs/grid.csv\n    enabled: false\n",
        )
        .expect("write");

        let registry = SourceRegistry::load(&path).await.expect("load");
        let master = registry.get("master").expect("master");
        assert_eq!(master.kind, SourceKind::MasterList);
        assert_eq!(master.path, dir.path().join("data/master.csv"));
        assert_eq!(registry.get("grid").expect("grid").path, PathBuf::from("/abs/grid.csv"));
        assert_eq!(registry.enabled().count(), 1);
        assert!(registry.get("nope").is_err());
    }

    #[tokio::test]
    async fn run_report_lands_in_run_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let now = Utc::now();
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            command: "restore".into(),
            started_at: now,
            finished_at: now,
            dry_run: true,
        };
        let run_dir = write_run_report(dir.path(), &record, &serde_json::json!({"planned": 1}), "Planned: 1")
            .await
            .expect("report");

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(run_dir.join("restore.json")).expect("json")).expect("parse");
        assert_eq!(json["result"]["planned"], 1);
        assert_eq!(json["run"]["command"], "restore");
        let summary = std::fs::read_to_string(run_dir.join("summary.md")).expect("summary");
        assert!(summary.contains("Planned: 1"));

        let index = recent_reports_markdown(5, dir.path()).expect("index");
        assert!(index.contains(&record.run_id.to_string()));
        assert!(index.contains("restore.json"));
    }
}
