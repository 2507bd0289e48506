//! Restoration and import planning. Pure: no store access happens here.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use roster_core::{Company, CompanyDraft, CompanyKey, Contact, ContactDraft, ContactKey, NewContact};
use serde::Serialize;

use crate::reconcile::{index_by_key, push_listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestorePolicy {
    /// Only restore companies that bring at least one contact with them.
    pub require_contacts: bool,
}

impl RestorePolicy {
    pub const RESTORE: Self = Self {
        require_contacts: true,
    };
    pub const IMPORT: Self = Self {
        require_contacts: false,
    };
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestorationUnit {
    pub company: CompanyDraft,
    pub contacts: Vec<ContactDraft>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RestorePlan {
    pub units: Vec<RestorationUnit>,
    pub skipped_existing: usize,
    pub skipped_without_contacts: usize,
    pub duplicate_contacts: usize,
    /// Contact rows whose company is absent from the companies source.
    pub unresolved_contacts: usize,
    pub unresolved_companies: Vec<String>,
}

impl RestorePlan {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn company_count(&self) -> usize {
        self.units.len()
    }

    pub fn contact_count(&self) -> usize {
        self.units.iter().map(|u| u.contacts.len()).sum()
    }

    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Planned: {} companies with {} contacts",
            self.company_count(),
            self.contact_count()
        ));
        push_listing(
            &mut lines,
            self.units
                .iter()
                .map(|u| format!("{} ({} contacts)", u.company.name, u.contacts.len())),
            self.units.len(),
            cap,
        );
        lines.push(format!("Already present remotely: {}", self.skipped_existing));
        if self.skipped_without_contacts > 0 {
            lines.push(format!("Skipped without contacts: {}", self.skipped_without_contacts));
        }
        if self.duplicate_contacts > 0 {
            lines.push(format!("Duplicate contact rows dropped: {}", self.duplicate_contacts));
        }
        if self.unresolved_contacts > 0 {
            lines.push(format!(
                "Contacts whose company is not in the source: {} (companies: {})",
                self.unresolved_contacts,
                self.unresolved_companies.len()
            ));
            push_listing(
                &mut lines,
                self.unresolved_companies.iter().cloned(),
                self.unresolved_companies.len(),
                cap,
            );
        }
        lines.join("\n")
    }
}

/// Companies absent from `existing`, each paired with its deduplicated contacts.
///
/// Output order follows `companies`; within a unit contacts keep their source order.
pub fn plan_restore(
    companies: &[CompanyDraft],
    contacts: &[ContactDraft],
    existing: &BTreeSet<CompanyKey>,
    policy: RestorePolicy,
) -> RestorePlan {
    let known: BTreeSet<CompanyKey> = companies.iter().map(CompanyDraft::key).collect();

    let mut plan = RestorePlan::default();
    let mut unresolved = BTreeSet::new();
    let mut grouped: BTreeMap<CompanyKey, Vec<&ContactDraft>> = BTreeMap::new();
    for contact in contacts {
        let key = contact.company_key();
        if known.contains(&key) {
            grouped.entry(key).or_default().push(contact);
        } else {
            plan.unresolved_contacts += 1;
            unresolved.insert(contact.company_name.trim().to_string());
        }
    }
    plan.unresolved_companies = unresolved.into_iter().collect();

    let mut seen = HashSet::new();
    for company in companies {
        let key = company.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if existing.contains(&key) {
            plan.skipped_existing += 1;
            continue;
        }

        let mut contact_keys = HashSet::new();
        let mut unit_contacts = Vec::new();
        for contact in grouped.get(&key).into_iter().flatten() {
            if contact_keys.insert(contact.key()) {
                unit_contacts.push((*contact).clone());
            } else {
                plan.duplicate_contacts += 1;
            }
        }

        if policy.require_contacts && unit_contacts.is_empty() {
            plan.skipped_without_contacts += 1;
            continue;
        }
        plan.units.push(RestorationUnit {
            company: company.clone(),
            contacts: unit_contacts,
        });
    }
    plan
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContactBackfillPlan {
    pub contacts: Vec<NewContact>,
    pub matched: usize,
    pub already_present: usize,
    pub unresolved_contacts: usize,
    pub unresolved_companies: Vec<String>,
}

impl ContactBackfillPlan {
    pub fn render(&self, cap: usize) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Contacts matched to a remote company: {}", self.matched));
        lines.push(format!("Already present: {}", self.already_present));
        lines.push(format!("To insert: {}", self.contacts.len()));
        if self.unresolved_contacts > 0 {
            lines.push(format!(
                "Unmatched contacts: {} (companies not found: {})",
                self.unresolved_contacts,
                self.unresolved_companies.len()
            ));
            push_listing(
                &mut lines,
                self.unresolved_companies.iter().cloned(),
                self.unresolved_companies.len(),
                cap,
            );
        }
        lines.join("\n")
    }
}

pub fn plan_contact_backfill(
    contacts: &[ContactDraft],
    remote_companies: &[Company],
    remote_contacts: &[Contact],
) -> ContactBackfillPlan {
    let index = index_by_key(remote_companies);
    let mut present: HashSet<ContactKey> = remote_contacts
        .iter()
        .map(|c| ContactKey::derive(&c.name, c.company_id))
        .collect();

    let mut plan = ContactBackfillPlan::default();
    let mut unresolved = BTreeSet::new();
    for contact in contacts {
        let Some(&company_id) = index.get(&contact.company_key()) else {
            plan.unresolved_contacts += 1;
            unresolved.insert(contact.company_name.trim().to_string());
            continue;
        };
        plan.matched += 1;
        if !present.insert(ContactKey::derive(&contact.name, company_id)) {
            plan.already_present += 1;
            continue;
        }
        plan.contacts.push(contact.clone().into_new_contact(company_id));
    }
    plan.unresolved_companies = unresolved.into_iter().collect();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(company: &str, name: &str) -> ContactDraft {
        ContactDraft {
            company_name: company.to_string(),
            name: name.to_string(),
            title: None,
            phone: None,
            mobile: None,
            email: None,
            notes: None,
        }
    }

    fn remote(id: i64, name: &str) -> Company {
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

    #[test]
    fn restore_only_missing_companies_with_contacts() {
        let companies = vec![
            CompanyDraft::new("Acme Inc"),
            CompanyDraft::new("Beta LLC"),
            CompanyDraft::new("Gamma Co"),
        ];
        let contacts = vec![
            contact("acme inc", "Jo Smith"),
            contact("Beta LLC", "Ann Lee"),
        ];
        let existing: BTreeSet<CompanyKey> = [CompanyKey::derive("Beta LLC")].into_iter().collect();

        let plan = plan_restore(&companies, &contacts, &existing, RestorePolicy::RESTORE);
        assert_eq!(plan.company_count(), 1);
        assert_eq!(plan.units[0].company.name, "Acme Inc");
        assert_eq!(plan.units[0].contacts[0].name, "Jo Smith");
        assert_eq!(plan.skipped_existing, 1);
        assert_eq!(plan.skipped_without_contacts, 1);
    }

    #[test]
    fn import_policy_keeps_companies_without_contacts() {
        let companies = vec![CompanyDraft::new("Gamma Co")];
        let plan = plan_restore(&companies, &[], &BTreeSet::new(), RestorePolicy::IMPORT);
        assert_eq!(plan.company_count(), 1);
        assert_eq!(plan.contact_count(), 0);
    }

    #[test]
    fn contacts_are_deduplicated_within_a_unit() {
        let companies = vec![CompanyDraft::new("Acme Inc")];
        let contacts = vec![
            contact("Acme Inc", "Jo Smith"),
            contact("ACME INC", " jo smith "),
            contact("Acme Inc", "Ann Lee"),
        ];
        let plan = plan_restore(&companies, &contacts, &BTreeSet::new(), RestorePolicy::RESTORE);
        assert_eq!(plan.contact_count(), 2);
        assert_eq!(plan.duplicate_contacts, 1);
    }

    #[test]
    fn unresolved_contacts_are_counted_not_dropped_silently() {
        let companies = vec![CompanyDraft::new("Acme Inc")];
        let contacts = vec![contact("Acme Inc", "Jo"), contact("Nowhere Ltd", "Pat"), contact("Nowhere Ltd", "Sam")];
        let plan = plan_restore(&companies, &contacts, &BTreeSet::new(), RestorePolicy::RESTORE);
        assert_eq!(plan.unresolved_contacts, 2);
        assert_eq!(plan.unresolved_companies, vec!["Nowhere Ltd".to_string()]);
    }

    #[test]
    fn planning_is_deterministic() {
        let companies: Vec<CompanyDraft> = ["Zeta", "Alpha", "Mu"].into_iter().map(CompanyDraft::new).collect();
        let contacts = vec![contact("Mu", "A"), contact("Zeta", "B"), contact("Alpha", "C")];
        let first = plan_restore(&companies, &contacts, &BTreeSet::new(), RestorePolicy::RESTORE);
        let second = plan_restore(&companies, &contacts, &BTreeSet::new(), RestorePolicy::RESTORE);
        assert_eq!(first, second);
        let names: Vec<&str> = first.units.iter().map(|u| u.company.name.as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mu"]);
    }

    #[test]
    fn backfill_skips_contacts_already_attached() {
        let companies = vec![remote(7, "Acme Inc"), remote(3, "acme inc")];
        let existing = vec![Contact {
            id: 1,
            company_id: 3,
            name: "Jo Smith".into(),
            title: None,
            phone: None,
            mobile: None,
            email: None,
            notes: None,
        }];
        let drafts = vec![
            contact("Acme Inc", "JO SMITH"),
            contact("Acme Inc", "Ann Lee"),
            contact("Acme Inc", "Ann Lee"),
            contact("Missing Co", "Pat"),
        ];

        let plan = plan_contact_backfill(&drafts, &companies, &existing);
        assert_eq!(plan.contacts.len(), 1);
        assert_eq!(plan.contacts[0].company_id, 3);
        assert_eq!(plan.already_present, 2);
        assert_eq!(plan.unresolved_contacts, 1);
        assert_eq!(plan.unresolved_companies, vec!["Missing Co".to_string()]);
    }
}
