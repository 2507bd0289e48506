//! Core domain model for the outreach roster: companies, contacts and the
//! dependent call/signup records that guard deletion.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

pub mod keys;
pub mod normalize;

pub use keys::{CompanyKey, ContactKey};

pub const CRATE_NAME: &str = "roster-core";

pub type RecordId = i64;

pub const COMPANIES_TABLE: &str = "companies";
pub const CONTACTS_TABLE: &str = "contacts";
pub const CALLS_TABLE: &str = "calls";
pub const SIGNUPS_TABLE: &str = "signups";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    #[default]
    NotStarted,
    InProgress,
    SignedUp,
    NotInterested,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::SignedUp => "signed_up",
            Self::NotInterested => "not_interested",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Bucket used by the companies-grid import: 10+ buildings is high, 5+ is medium.
    pub fn from_building_count(buildings: u32) -> Self {
        if buildings >= 10 {
            Self::High
        } else if buildings >= 5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyDraft {
    pub name: String,
    pub address: Option<String>,
    pub num_buildings: u32,
    pub account_manager: Option<String>,
    pub sales_rep: Option<String>,
    pub assigned_to: Option<String>,
    pub status: CompanyStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, JsonValue>,
}

impl CompanyDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            num_buildings: 0,
            account_manager: None,
            sales_rep: None,
            assigned_to: None,
            status: CompanyStatus::NotStarted,
            priority: Priority::Medium,
            metadata: Map::new(),
        }
    }

    pub fn key(&self) -> CompanyKey {
        CompanyKey::derive(&self.name)
    }
}

/// A contact as read from a tabular source. `company_name` is the owning
/// company's natural name and is resolved to an id only at insertion time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub company_name: String,
    pub name: String,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

impl ContactDraft {
    pub fn company_key(&self) -> CompanyKey {
        CompanyKey::derive(&self.company_name)
    }

    pub fn key(&self) -> ContactKey {
        ContactKey::derive(&self.name, self.company_key())
    }

    pub fn into_new_contact(self, company_id: RecordId) -> NewContact {
        NewContact {
            company_id,
            name: self.name,
            title: self.title,
            phone: self.phone,
            mobile: self.mobile,
            email: self.email,
            notes: self.notes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContact {
    pub company_id: RecordId,
    pub name: String,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub email: Option<String>,
    pub notes: Option<String>,
}

/// Company row as stored remotely. Every column except `id` and `name` is
/// optional so partial selects deserialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub num_buildings: Option<u32>,
    #[serde(default)]
    pub account_manager: Option<String>,
    #[serde(default)]
    pub sales_rep: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: Option<CompanyStatus>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl Company {
    pub fn key(&self) -> CompanyKey {
        CompanyKey::derive(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: RecordId,
    pub company_id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Minimal projection of a call or signup row: only the parent reference matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentRef {
    pub company_id: RecordId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentKind {
    Calls,
    Signups,
}

impl DependentKind {
    pub const ALL: [DependentKind; 2] = [DependentKind::Calls, DependentKind::Signups];

    pub fn table(&self) -> &'static str {
        match self {
            Self::Calls => CALLS_TABLE,
            Self::Signups => SIGNUPS_TABLE,
        }
    }
}
