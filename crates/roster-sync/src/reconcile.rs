//! Presence/absence reconciliation between named key sets.
//!
//! Purely informational: nothing here talks to the store.

use std::collections::{BTreeMap, BTreeSet};

use roster_core::{Company, CompanyKey, RecordId};
use serde::Serialize;

pub const LISTING_CAP: usize = 20;

/// A named set of company keys, with the first spelling seen kept as label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct KeySet {
    pub name: String,
    pub labels: BTreeMap<CompanyKey, String>,
}

impl KeySet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn from_names<'a>(name: impl Into<String>, names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = Self::new(name);
        for company in names {
            set.insert(company);
        }
        set
    }

    pub fn from_labels(name: impl Into<String>, labels: BTreeMap<CompanyKey, String>) -> Self {
        Self {
            name: name.into(),
            labels,
        }
    }

    pub fn insert(&mut self, company: &str) {
        self.labels
            .entry(CompanyKey::derive(company))
            .or_insert_with(|| company.trim().to_string());
    }

    pub fn contains(&self, key: &CompanyKey) -> bool {
        self.labels.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn keys(&self) -> BTreeSet<CompanyKey> {
        self.labels.keys().cloned().collect()
    }

    fn entry(&self, key: &CompanyKey) -> ReportEntry {
        ReportEntry {
            key: key.clone(),
            name: self
                .labels
                .get(key)
                .cloned()
                .unwrap_or_else(|| key.to_string()),
            also_in: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    pub key: CompanyKey,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub also_in: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDiff {
    pub source: String,
    pub source_size: usize,
    pub missing_in_target: Vec<ReportEntry>,
}

impl SourceDiff {
    /// Missing keys that another source has (an import problem rather than a data problem).
    pub fn import_issues(&self) -> usize {
        self.missing_in_target
            .iter()
            .filter(|e| !e.also_in.is_empty())
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKey {
    pub key: CompanyKey,
    pub names: Vec<String>,
    pub ids: Vec<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentConflict {
    pub key: CompanyKey,
    pub company: String,
    pub company_id: RecordId,
    pub source: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub target: String,
    pub target_size: usize,
    pub sources: Vec<SourceDiff>,
    pub extra_in_target: Vec<ReportEntry>,
    pub duplicates_in_target: Vec<DuplicateKey>,
    pub assignment_conflicts: Vec<AssignmentConflict>,
}

/// `source - target` per source, and `target - union(sources)`, all in key order.
pub fn reconcile(sources: &[KeySet], target: &KeySet) -> ReconciliationReport {
    let diffs = sources
        .iter()
        .enumerate()
        .map(|(idx, source)| {
            let missing_in_target = source
                .labels
                .keys()
                .filter(|key| !target.contains(key))
                .map(|key| {
                    let mut entry = source.entry(key);
                    entry.also_in = sources
                        .iter()
                        .enumerate()
                        .filter(|(other, set)| *other != idx && set.contains(key))
                        .map(|(_, set)| set.name.clone())
                        .collect();
                    entry
                })
                .collect();
            SourceDiff {
                source: source.name.clone(),
                source_size: source.len(),
                missing_in_target,
            }
        })
        .collect();

    let extra_in_target = target
        .labels
        .keys()
        .filter(|key| !sources.iter().any(|s| s.contains(key)))
        .map(|key| target.entry(key))
        .collect();

    ReconciliationReport {
        target: target.name.clone(),
        target_size: target.len(),
        sources: diffs,
        extra_in_target,
        duplicates_in_target: Vec::new(),
        assignment_conflicts: Vec::new(),
    }
}

/// Remote companies sharing a folded key. Flagged, never merged.
pub fn duplicate_keys(companies: &[Company]) -> Vec<DuplicateKey> {
    let mut grouped: BTreeMap<CompanyKey, Vec<&Company>> = BTreeMap::new();
    for company in companies {
        grouped.entry(company.key()).or_default().push(company);
    }
    grouped
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .map(|(key, mut group)| {
            group.sort_by_key(|c| c.id);
            DuplicateKey {
                key,
                names: group.iter().map(|c| c.name.clone()).collect(),
                ids: group.iter().map(|c| c.id).collect(),
            }
        })
        .collect()
}

/// Folded key to remote id. With duplicates the lowest id wins.
pub fn index_by_key(companies: &[Company]) -> BTreeMap<CompanyKey, RecordId> {
    let mut index: BTreeMap<CompanyKey, RecordId> = BTreeMap::new();
    for company in companies {
        index
            .entry(company.key())
            .and_modify(|id| *id = (*id).min(company.id))
            .or_insert(company.id);
    }
    index
}

pub fn compare_assignments(
    source: &BTreeMap<CompanyKey, String>,
    target: &[Company],
) -> Vec<AssignmentConflict> {
    let mut conflicts: Vec<AssignmentConflict> = target
        .iter()
        .filter_map(|company| {
            let key = company.key();
            let caller = source.get(&key)?;
            if company.assigned_to.as_deref() == Some(caller.as_str()) {
                return None;
            }
            Some(AssignmentConflict {
                key,
                company: company.name.clone(),
                company_id: company.id,
                source: caller.clone(),
                target: company.assigned_to.clone(),
            })
        })
        .collect();
    conflicts.sort_by(|a, b| a.key.cmp(&b.key).then(a.company_id.cmp(&b.company_id)));
    conflicts
}

pub(crate) fn push_listing<I>(lines: &mut Vec<String>, items: I, total: usize, cap: usize)
where
    I: IntoIterator<Item = String>,
{
    for item in items.into_iter().take(cap) {
        lines.push(format!("  - {item}"));
    }
    if total > cap {
        lines.push("  ... and more".to_string());
    }
}

impl ReconciliationReport {
    pub fn missing_total(&self) -> usize {
        self.sources.iter().map(|s| s.missing_in_target.len()).sum()
    }

    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push("=== MISSING COMPANIES ===".to_string());
        for diff in &self.sources {
            lines.push(format!(
                "\nCompanies in {} but NOT in {}: {}",
                diff.source,
                self.target,
                diff.missing_in_target.len()
            ));
            push_listing(
                &mut lines,
                diff.missing_in_target.iter().map(|e| {
                    if e.also_in.is_empty() {
                        e.name.clone()
                    } else {
                        format!("{} (also in {})", e.name, e.also_in.join(", "))
                    }
                }),
                diff.missing_in_target.len(),
                cap,
            );
            if self.sources.len() > 1 && !diff.missing_in_target.is_empty() {
                let import_issues = diff.import_issues();
                lines.push(format!("{import_issues} missing companies ARE in another source (import issue)"));
                lines.push(format!(
                    "{} missing companies are NOT in any other source (data issue)",
                    diff.missing_in_target.len() - import_issues
                ));
            }
        }

        lines.push("\n=== EXTRA COMPANIES ===".to_string());
        lines.push(format!(
            "Companies in {} but NOT in any source: {}",
            self.target,
            self.extra_in_target.len()
        ));
        push_listing(
            &mut lines,
            self.extra_in_target.iter().map(|e| e.name.clone()),
            self.extra_in_target.len(),
            cap,
        );

        if !self.duplicates_in_target.is_empty() {
            lines.push(format!("\n=== DUPLICATE NAMES IN {} ===", self.target.to_uppercase()));
            push_listing(
                &mut lines,
                self.duplicates_in_target.iter().map(|d| {
                    let ids: Vec<String> = d.ids.iter().map(|id| id.to_string()).collect();
                    format!("{} (ids {})", d.names[0], ids.join(", "))
                }),
                self.duplicates_in_target.len(),
                cap,
            );
        }

        if !self.assignment_conflicts.is_empty() {
            lines.push("\n=== CALLER ASSIGNMENT CONFLICTS ===".to_string());
            push_listing(
                &mut lines,
                self.assignment_conflicts.iter().map(|c| {
                    format!(
                        "{}: source={}, target={}",
                        c.company,
                        c.source,
                        c.target.as_deref().unwrap_or("unassigned")
                    )
                }),
                self.assignment_conflicts.len(),
                cap,
            );
        }

        lines.push("\n=== SUMMARY ===".to_string());
        for diff in &self.sources {
            lines.push(format!("{}: {} companies", diff.source, diff.source_size));
        }
        lines.push(format!("{}: {} companies", self.target, self.target_size));
        lines.push(format!("Missing from {}: {}", self.target, self.missing_total()));
        lines.push(format!("Extra in {}: {}", self.target, self.extra_in_target.len()));
        lines.push(format!("Caller conflicts: {}", self.assignment_conflicts.len()));
        lines.join("\n")
    }
}
