//! Caller assignment corrections derived from reconciliation conflicts.


use roster_core::{CompanyStatus, RecordId};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

use crate::reconcile::{push_listing, AssignmentConflict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentUpdate {
    pub company_id: RecordId,
    pub company: String,
    pub previous: Option<String>,
    pub assigned_to: String,
    /// Newly assigned companies restart at `not_started`; reassignments keep their status.
    pub reset_status: bool,
}

impl AssignmentUpdate {
    pub fn patch(&self) -> JsonValue {
        let mut patch = json!({ "assigned_to": self.assigned_to });
        if self.reset_status {
            patch["status"] = json!(CompanyStatus::NotStarted.as_str());
        }
        patch
    }
}

pub fn plan_assignment_updates(conflicts: &[AssignmentConflict]) -> Vec<AssignmentUpdate> {
    conflicts
        .iter()
        .map(|conflict| AssignmentUpdate {
            company_id: conflict.company_id,
            company: conflict.company.clone(),
            previous: conflict.target.clone(),
            assigned_to: conflict.source.clone(),
            reset_status: conflict.target.is_none(),
        })
        .collect()
}

pub fn render_updates(updates: &[AssignmentUpdate], cap: usize) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Companies needing caller updates: {}", updates.len()));
    push_listing(
        &mut lines,
        updates.iter().map(|u| {
            format!(
                "{}: {} -> {}",
                u.company,
                u.previous.as_deref().unwrap_or("unassigned"),
                u.assigned_to
            )
        }),
        updates.len(),
        cap,
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::CompanyKey;

    fn conflict(id: RecordId, target: Option<&str>) -> AssignmentConflict {
        AssignmentConflict {
            key: CompanyKey::derive("Acme Inc"),
            company: "Acme Inc".into(),
            company_id: id,
            source: "Sam".into(),
            target: target.map(str::to_string),
        }
    }

    #[test]
    fn reassignment_keeps_status() {
        let updates = plan_assignment_updates(&[conflict(1, Some("Alex"))]);
        assert!(!updates[0].reset_status);
        assert_eq!(updates[0].patch(), json!({"assigned_to": "Sam"}));
    }

    #[test]
    fn first_assignment_resets_status() {
        let updates = plan_assignment_updates(&[conflict(2, None)]);
        assert_eq!(
            updates[0].patch(),
            json!({"assigned_to": "Sam", "status": "not_started"})
        );
        assert!(render_updates(&updates, 20).contains("Acme Inc: unassigned -> Sam"));
    }
}
