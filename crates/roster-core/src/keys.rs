//! Matching keys used for cross-source identity.
//!
//! Folding is trim + lowercase only. Internal whitespace and punctuation are
//! left alone, so "Acme  Inc" and "Acme Inc" are different keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RecordId;

/// Separator between the contact name and its owner; not expected in names.
pub const CONTACT_KEY_SEPARATOR: char = '\u{1f}';

pub fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyKey(String);

impl CompanyKey {
    pub fn derive(name: &str) -> Self {
        Self(fold(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Owner half of a contact key: either a source-side company key or a remote id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContactOwner {
    Key(CompanyKey),
    Id(RecordId),
}

impl From<CompanyKey> for ContactOwner {
    fn from(key: CompanyKey) -> Self {
        Self::Key(key)
    }
}

impl From<RecordId> for ContactOwner {
    fn from(id: RecordId) -> Self {
        Self::Id(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactKey(String);

impl ContactKey {
    pub fn derive(name: &str, owner: impl Into<ContactOwner>) -> Self {
        let owner = match owner.into() {
            ContactOwner::Key(key) => key.0,
            ContactOwner::Id(id) => format!("#{id}"),
        };
        Self(format!("{}{CONTACT_KEY_SEPARATOR}{owner}", fold(name)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn company_key_folds_case_and_trims() {
        assert_eq!(CompanyKey::derive("  ACME Inc "), CompanyKey::derive("acme inc"));
        assert_eq!(CompanyKey::derive("Acme Inc").as_str(), "acme inc");
    }

    #[test]
    fn company_key_keeps_internal_whitespace_and_punctuation() {
        assert_ne!(CompanyKey::derive("Acme  Inc"), CompanyKey::derive("Acme Inc"));
        assert_ne!(CompanyKey::derive("Acme, Inc."), CompanyKey::derive("Acme Inc"));
    }

    #[test]
    fn contact_key_is_scoped_by_owner() {
        let acme = CompanyKey::derive("Acme Inc");
        let beta = CompanyKey::derive("Beta LLC");
        assert_eq!(
            ContactKey::derive("Jane Doe", acme.clone()),
            ContactKey::derive(" jane doe", acme.clone())
        );
        assert_ne!(ContactKey::derive("Jane Doe", acme), ContactKey::derive("Jane Doe", beta));
        assert_ne!(ContactKey::derive("Jane Doe", 1_i64), ContactKey::derive("Jane Doe", 11_i64));
    }

    #[test]
    fn id_owner_never_collides_with_key_owner() {
        let by_key = ContactKey::derive("Jane", CompanyKey::derive("7"));
        let by_id = ContactKey::derive("Jane", 7_i64);
        assert_ne!(by_key, by_id);
    }
}
