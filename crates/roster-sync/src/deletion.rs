//! Orphan detection and all-or-nothing deletion planning.
//!
//! A plan only exists when no candidate is referenced by a dependent
//! collection. Executing it requires a [`ConfirmedDeletion`], which can only
//! be obtained by echoing the plan fingerprint back.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use async_trait::async_trait;
use roster_core::{Company, DependentKind, DependentRef, RecordId};
use roster_storage::{Paginator, RemoteError, RemoteStore, SelectQuery, DEFAULT_BATCH_SIZE};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::reconcile::push_listing;

const FINGERPRINT_LEN: usize = 12;

/// Companies with no contact referencing them, in input order.
pub fn find_orphans(companies: &[Company], contact_links: &[DependentRef]) -> Vec<Company> {
    let referenced: HashSet<RecordId> = contact_links.iter().map(|l| l.company_id).collect();
    companies
        .iter()
        .filter(|c| !referenced.contains(&c.id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrphanSummary {
    pub total_companies: usize,
    pub with_contacts: usize,
    pub orphans: Vec<Company>,
}

impl OrphanSummary {
    pub fn new(companies: &[Company], contact_links: &[DependentRef]) -> Self {
        let orphans = find_orphans(companies, contact_links);
        Self {
            total_companies: companies.len(),
            with_contacts: companies.len() - orphans.len(),
            orphans,
        }
    }

    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Total companies: {}", self.total_companies));
        lines.push(format!("Companies with contacts: {}", self.with_contacts));
        lines.push(format!("Companies WITHOUT contacts: {}", self.orphans.len()));
        push_listing(
            &mut lines,
            self.orphans.iter().map(|c| format!("{} (id {})", c.name, c.id)),
            self.orphans.len(),
            cap,
        );
        lines.join("\n")
    }
}

#[async_trait]
pub trait DependentLookup: Send + Sync {
    async fn dependents(
        &self,
        kind: DependentKind,
        company_ids: &[RecordId],
    ) -> Result<Vec<DependentRef>, RemoteError>;
}

pub struct StoreDependents<'a> {
    store: &'a dyn RemoteStore,
    page_size: usize,
    chunk_size: usize,
}

impl<'a> StoreDependents<'a> {
    pub fn new(store: &'a dyn RemoteStore, page_size: usize) -> Self {
        Self {
            store,
            page_size,
            chunk_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[async_trait]
impl DependentLookup for StoreDependents<'_> {
    async fn dependents(
        &self,
        kind: DependentKind,
        company_ids: &[RecordId],
    ) -> Result<Vec<DependentRef>, RemoteError> {
        Paginator::new(self.store)
            .with_page_size(self.page_size)
            .fetch_in_chunks(
                kind.table(),
                &SelectQuery::new("id, company_id"),
                "company_id",
                company_ids,
                self.chunk_size,
            )
            .await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDeletion {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    pub companies: Vec<PlannedDeletion>,
    pub batches: Vec<Vec<RecordId>>,
    pub fingerprint: String,
}

impl DeletionPlan {
    pub fn ids(&self) -> Vec<RecordId> {
        self.companies.iter().map(|c| c.id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    /// Exchange the plan for an executable one. The token must equal the fingerprint.
    pub fn confirm(self, token: &str) -> Result<ConfirmedDeletion, ConfirmError> {
        if token.trim() != self.fingerprint {
            return Err(ConfirmError::Mismatch {
                given: token.trim().to_string(),
                expected: self.fingerprint,
            });
        }
        Ok(ConfirmedDeletion { plan: self })
    }

    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "{} companies will be deleted in {} batches",
            self.companies.len(),
            self.batches.len()
        ));
        push_listing(
            &mut lines,
            self.companies.iter().map(|c| format!("{} (id {})", c.name, c.id)),
            self.companies.len(),
            cap,
        );
        lines.push(format!("Confirmation token: {}", self.fingerprint));
        lines.join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmedDeletion {
    plan: DeletionPlan,
}

impl ConfirmedDeletion {
    pub fn plan(&self) -> &DeletionPlan {
        &self.plan
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfirmError {
    #[error("confirmation token `{given}` does not match plan fingerprint `{expected}`")]
    Mismatch { given: String, expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockReason {
    pub kind: DependentKind,
    pub rows: usize,
    pub companies: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionBlock {
    pub candidates: usize,
    pub reasons: Vec<BlockReason>,
}

impl fmt::Display for DeletionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deletion of {} companies refused:", self.candidates)?;
        for reason in &self.reasons {
            write!(
                f,
                " {} {} rows reference {} of them;",
                reason.rows,
                reason.kind.table(),
                reason.companies
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeletionOutcome {
    Planned(DeletionPlan),
    Blocked(DeletionBlock),
}

/// Leading hex digits of sha256 over the ordered ids.
pub fn plan_fingerprint(ids: &[RecordId]) -> String {
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.to_string().as_bytes());
        hasher.update(b",");
    }
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Every dependent kind is checked before deciding, so a refusal lists all of them.
pub async fn plan_deletion(
    candidates: &[Company],
    lookup: &dyn DependentLookup,
    batch_size: usize,
) -> Result<DeletionOutcome, RemoteError> {
    let mut ordered: BTreeMap<RecordId, &Company> = BTreeMap::new();
    for company in candidates {
        ordered.insert(company.id, company);
    }
    let ids: Vec<RecordId> = ordered.keys().copied().collect();

    let mut reasons = Vec::new();
    if !ids.is_empty() {
        for kind in DependentKind::ALL {
            let rows = lookup.dependents(kind, &ids).await?;
            let referenced: BTreeSet<RecordId> = rows
                .iter()
                .map(|r| r.company_id)
                .filter(|id| ordered.contains_key(id))
                .collect();
            if !referenced.is_empty() {
                warn!(
                    table = kind.table(),
                    rows = rows.len(),
                    companies = referenced.len(),
                    "deletion candidates are referenced"
                );
                reasons.push(BlockReason {
                    kind,
                    rows: rows.len(),
                    companies: referenced.len(),
                });
            }
        }
    }

    if !reasons.is_empty() {
        return Ok(DeletionOutcome::Blocked(DeletionBlock {
            candidates: ids.len(),
            reasons,
        }));
    }

    let batch_size = batch_size.clamp(1, DEFAULT_BATCH_SIZE);
    let plan = DeletionPlan {
        companies: ordered
            .values()
            .map(|c| PlannedDeletion {
                id: c.id,
                name: c.name.clone(),
            })
            .collect(),
        batches: ids.chunks(batch_size).map(<[RecordId]>::to_vec).collect(),
        fingerprint: plan_fingerprint(&ids),
    };
    info!(companies = plan.companies.len(), batches = plan.batches.len(), "deletion planned");
    Ok(DeletionOutcome::Planned(plan))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: RecordId, name: &str) -> Company {
        Company {
            id,
            name: name.to_string(),
            address: None,
            num_buildings: None,
            account_manager: None,
            sales_rep: None,
            assigned_to: None,
            status: None,
            priority: None,
        }
    }

    struct FixedLookup {
        calls: Vec<DependentRef>,
        signups: Vec<DependentRef>,
    }

    #[async_trait]
    impl DependentLookup for FixedLookup {
        async fn dependents(
            &self,
            kind: DependentKind,
            company_ids: &[RecordId],
        ) -> Result<Vec<DependentRef>, RemoteError> {
            let rows = match kind {
                DependentKind::Calls => &self.calls,
                DependentKind::Signups => &self.signups,
            };
            Ok(rows
                .iter()
                .filter(|r| company_ids.contains(&r.company_id))
                .copied()
                .collect())
        }
    }

    #[test]
    fn orphans_are_companies_without_contact_links() {
        let companies = vec![company(1, "Acme Inc"), company(2, "Beta LLC"), company(3, "Gamma Co")];
        let links = vec![DependentRef { company_id: 2 }, DependentRef { company_id: 2 }];
        let summary = OrphanSummary::new(&companies, &links);
        assert_eq!(summary.with_contacts, 1);
        let ids: Vec<RecordId> = summary.orphans.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[tokio::test]
    async fn any_reference_blocks_the_whole_plan() {
        let candidates = vec![company(1, "A"), company(2, "B"), company(3, "C")];
        let lookup = FixedLookup {
            calls: vec![DependentRef { company_id: 2 }],
            signups: Vec::new(),
        };
        let outcome = plan_deletion(&candidates, &lookup, 100).await.expect("plan");
        match outcome {
            DeletionOutcome::Blocked(block) => {
                assert_eq!(block.candidates, 3);
                assert_eq!(
                    block.reasons,
                    vec![BlockReason {
                        kind: DependentKind::Calls,
                        rows: 1,
                        companies: 1
                    }]
                );
            }
            DeletionOutcome::Planned(_) => panic!("referenced company must block deletion"),
        }
    }

    #[tokio::test]
    async fn unreferenced_candidates_are_planned_in_batches() {
        let candidates: Vec<Company> = (1..=250).rev().map(|id| company(id, "x")).collect();
        let lookup = FixedLookup {
            calls: vec![DependentRef { company_id: 999 }],
            signups: Vec::new(),
        };
        let DeletionOutcome::Planned(plan) = plan_deletion(&candidates, &lookup, 100).await.expect("plan") else {
            panic!("expected a plan");
        };
        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0][0], 1);
        assert_eq!(plan.batches[2].len(), 50);
        assert_eq!(plan.fingerprint.len(), 12);
    }

    #[tokio::test]
    async fn confirmation_requires_matching_token() {
        let lookup = FixedLookup {
            calls: Vec::new(),
            signups: Vec::new(),
        };
        let DeletionOutcome::Planned(plan) = plan_deletion(&[company(5, "Acme Inc")], &lookup, 100)
            .await
            .expect("plan")
        else {
            panic!("expected a plan");
        };
        let token = plan.fingerprint.clone();
        assert!(matches!(
            plan.clone().confirm("000000000000"),
            Err(ConfirmError::Mismatch { .. })
        ));
        let confirmed = plan.confirm(&token).expect("confirmed");
        assert_eq!(confirmed.plan().ids(), vec![5]);
    }

    #[test]
    fn fingerprint_depends_on_ids() {
        assert_eq!(plan_fingerprint(&[1, 2, 3]), plan_fingerprint(&[1, 2, 3]));
        assert_ne!(plan_fingerprint(&[1, 2, 3]), plan_fingerprint(&[1, 2, 4]));
    }
}
