//! Tabular source readers + per-export adapters.
//!
//! Every export revision the roster has been shipped in gets an adapter that
//! turns raw CSV rows into company/contact drafts and caller assignments.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use roster_core::normalize::{clean_value, first_email, full_name, normalize_phone, parse_count};
use roster_core::{CompanyDraft, CompanyKey, CompanyStatus, ContactDraft, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "roster-adapters";

const BYTE_ORDER_MARK: char = '\u{feff}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MasterList,
    CompaniesGrid,
    ContactsGrid,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source {} unavailable: {source}", path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("row at line {line}: {message}")]
    Row { line: u64, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderMatch {
    Exact(usize),
    Fallback(usize),
    Ambiguous { chosen: usize, candidates: Vec<String> },
    Missing,
}

impl HeaderMatch {
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Exact(idx) | Self::Fallback(idx) => Some(*idx),
            Self::Ambiguous { chosen, .. } => Some(*chosen),
            Self::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderAmbiguity {
    pub column: String,
    pub chosen: String,
    pub candidates: Vec<String>,
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches(BYTE_ORDER_MARK).trim().to_string()
}

/// Exact header wins; otherwise the first header containing `expected`.
pub fn resolve_header(headers: &[String], expected: &str) -> HeaderMatch {
    resolve_unclaimed(headers, expected, &BTreeSet::new())
}

/// Like [`resolve_header`], but the substring fallback skips headers that are
/// already an exact match for another column.
fn resolve_unclaimed(headers: &[String], expected: &str, claimed: &BTreeSet<usize>) -> HeaderMatch {
    if let Some(idx) = headers.iter().position(|h| h == expected) {
        return HeaderMatch::Exact(idx);
    }
    let candidates: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(idx, h)| !claimed.contains(idx) && h.contains(expected))
        .map(|(idx, _)| idx)
        .collect();
    match candidates.as_slice() {
        [] => HeaderMatch::Missing,
        [only] => HeaderMatch::Fallback(*only),
        [first, ..] => HeaderMatch::Ambiguous {
            chosen: *first,
            candidates: candidates.iter().map(|idx| headers[*idx].clone()).collect(),
        },
    }
}

#[derive(Debug, Clone)]
pub struct ColumnMap {
    headers: Vec<String>,
    resolved: HashMap<String, Option<usize>>,
    claimed: BTreeSet<usize>,
    ambiguities: Vec<HeaderAmbiguity>,
}

impl ColumnMap {
    pub fn new<'a>(raw_headers: impl IntoIterator<Item = &'a str>, columns: &[&str]) -> Self {
        let headers: Vec<String> = raw_headers.into_iter().map(normalize_header).collect();
        let claimed: BTreeSet<usize> = columns
            .iter()
            .filter_map(|column| headers.iter().position(|h| h == column))
            .collect();
        let mut resolved = HashMap::new();
        let mut ambiguities = Vec::new();
        for column in columns {
            let found = resolve_unclaimed(&headers, column, &claimed);
            if let HeaderMatch::Ambiguous { chosen, candidates } = &found {
                warn!(column, chosen = %headers[*chosen], ?candidates, "ambiguous header fallback");
                ambiguities.push(HeaderAmbiguity {
                    column: column.to_string(),
                    chosen: headers[*chosen].clone(),
                    candidates: candidates.clone(),
                });
            }
            resolved.insert(column.to_string(), found.index());
        }
        Self {
            headers,
            resolved,
            claimed,
            ambiguities,
        }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn ambiguities(&self) -> &[HeaderAmbiguity] {
        &self.ambiguities
    }

    pub fn index_of(&self, column: &str) -> Option<usize> {
        match self.resolved.get(column) {
            Some(found) => *found,
            None => resolve_unclaimed(&self.headers, column, &self.claimed).index(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawRow {
    line: u64,
    record: csv::StringRecord,
    columns: Arc<ColumnMap>,
}

impl RawRow {
    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .index_of(column)
            .and_then(|idx| self.record.get(idx))
    }

    pub fn clean(&self, column: &str) -> Option<String> {
        clean_value(self.get(column))
    }
}

/// Lazy, single-pass row sequence. Row-level errors are yielded and the
/// iteration carries on with the next row.
pub struct RowIter<R> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Arc<ColumnMap>,
}

impl<R: Read> RowIter<R> {
    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }
}

impl<R: Read> Iterator for RowIter<R> {
    type Item = Result<RawRow, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.next()?;
        Some(match next {
            Ok(record) => Ok(RawRow {
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                record,
                columns: Arc::clone(&self.columns),
            }),
            Err(err) => Err(SourceError::Row {
                line: err.position().map(|p| p.line()).unwrap_or_default(),
                message: err.to_string(),
            }),
        })
    }
}

fn csv_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).flexible(true).trim(csv::Trim::None);
    builder
}

fn rows_from_csv<R: Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
    columns: &[&str],
) -> Result<RowIter<R>, SourceError> {
    let headers = reader
        .headers()
        .map_err(|source| SourceError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let columns = Arc::new(ColumnMap::new(headers.iter(), columns));
    Ok(RowIter {
        records: reader.into_records(),
        columns,
    })
}

pub fn read_rows(path: impl AsRef<Path>, columns: &[&str]) -> Result<RowIter<File>, SourceError> {
    let path = path.as_ref();
    let reader = csv_builder()
        .from_path(path)
        .map_err(|source| SourceError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;
    rows_from_csv(reader, path, columns)
}

pub fn read_rows_from_reader<R: Read>(
    reader: R,
    label: &str,
    columns: &[&str],
) -> Result<RowIter<R>, SourceError> {
    rows_from_csv(csv_builder().from_reader(reader), Path::new(label), columns)
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceDataset {
    pub source_id: String,
    pub kind: SourceKind,
    pub companies: Vec<CompanyDraft>,
    pub contacts: Vec<ContactDraft>,
    pub caller_assignments: BTreeMap<CompanyKey, String>,
    pub rows_read: usize,
    pub skipped_rows: usize,
    pub duplicate_company_rows: usize,
    pub caller_conflicts: usize,
    pub row_errors: Vec<String>,
    pub header_ambiguities: Vec<HeaderAmbiguity>,
    #[serde(skip)]
    company_index: HashMap<CompanyKey, usize>,
}

impl SourceDataset {
    pub fn new(source_id: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            companies: Vec::new(),
            contacts: Vec::new(),
            caller_assignments: BTreeMap::new(),
            rows_read: 0,
            skipped_rows: 0,
            duplicate_company_rows: 0,
            caller_conflicts: 0,
            row_errors: Vec::new(),
            header_ambiguities: Vec::new(),
            company_index: HashMap::new(),
        }
    }

    /// First row wins; later rows for the same key are counted, not merged.
    pub fn add_company(&mut self, draft: CompanyDraft) -> bool {
        let key = draft.key();
        if self.company_index.contains_key(&key) {
            self.duplicate_company_rows += 1;
            return false;
        }
        self.company_index.insert(key, self.companies.len());
        self.companies.push(draft);
        true
    }

    pub fn company(&self, key: &CompanyKey) -> Option<&CompanyDraft> {
        self.company_index.get(key).map(|idx| &self.companies[*idx])
    }

    /// First non-empty caller per company wins. A company picking up a caller
    /// moves from not started to in progress.
    pub fn assign_caller(&mut self, key: CompanyKey, caller: String) {
        if let Some(existing) = self.caller_assignments.get(&key) {
            if existing != &caller {
                self.caller_conflicts += 1;
            }
            return;
        }
        if let Some(idx) = self.company_index.get(&key) {
            let company = &mut self.companies[*idx];
            if company.assigned_to.is_none() {
                company.assigned_to = Some(caller.clone());
            }
            if company.status == CompanyStatus::NotStarted {
                company.status = CompanyStatus::InProgress;
            }
        }
        self.caller_assignments.insert(key, caller);
    }

    pub fn company_keys(&self) -> BTreeSet<CompanyKey> {
        self.companies.iter().map(CompanyDraft::key).collect()
    }

    pub fn company_labels(&self) -> BTreeMap<CompanyKey, String> {
        let mut labels = BTreeMap::new();
        for company in &self.companies {
            labels.entry(company.key()).or_insert_with(|| company.name.clone());
        }
        for contact in &self.contacts {
            labels
                .entry(contact.company_key())
                .or_insert_with(|| contact.company_name.clone());
        }
        labels
    }

    pub fn contacts_by_company(&self) -> BTreeMap<CompanyKey, Vec<&ContactDraft>> {
        let mut grouped: BTreeMap<CompanyKey, Vec<&ContactDraft>> = BTreeMap::new();
        for contact in &self.contacts {
            grouped.entry(contact.company_key()).or_default().push(contact);
        }
        grouped
    }
}

pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn columns(&self) -> &'static [&'static str];
    fn ingest(&self, row: &RawRow, dataset: &mut SourceDataset);
}

pub struct MasterListAdapter;

impl MasterListAdapter {
    const COLUMNS: &'static [&'static str] = &[
        "Company",
        "Caller",
        "Office Address",
        "Mailing Address",
        "NumOfBuildings",
        "Account Manager",
        "Sales Rep",
        "Status",
        "Notes",
        "First",
        "Last",
        "Title",
        "Phone",
        "Mobile",
        "Email",
    ];
}

impl SourceAdapter for MasterListAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::MasterList
    }

    fn columns(&self) -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn ingest(&self, row: &RawRow, dataset: &mut SourceDataset) {
        let Some(company_name) = row.clean("Company") else {
            dataset.skipped_rows += 1;
            return;
        };
        let key = CompanyKey::derive(&company_name);

        if dataset.company(&key).is_none() {
            let mut draft = CompanyDraft::new(company_name.clone());
            draft.address = row.clean("Office Address").or_else(|| row.clean("Mailing Address"));
            draft.num_buildings = parse_count(row.get("NumOfBuildings"));
            draft.account_manager = row.clean("Account Manager");
            draft.sales_rep = row.clean("Sales Rep");
            draft.priority = Priority::Medium;
            if let Some(status) = row.clean("Status") {
                draft
                    .metadata
                    .insert("original_status".into(), JsonValue::String(status));
            }
            if let Some(notes) = row.clean("Notes") {
                draft.metadata.insert("notes".into(), JsonValue::String(notes));
            }
            dataset.add_company(draft);
        } else {
            dataset.duplicate_company_rows += 1;
        }

        if let Some(caller) = row.clean("Caller") {
            dataset.assign_caller(key, caller);
        }

        if let Some(name) = full_name(row.get("First"), row.get("Last")) {
            dataset.contacts.push(ContactDraft {
                company_name,
                name,
                title: row.clean("Title"),
                phone: normalize_phone(row.get("Phone")),
                mobile: normalize_phone(row.get("Mobile")),
                email: first_email(row.get("Email")),
                notes: row.clean("Notes"),
            });
        }
    }
}

pub struct CompaniesGridAdapter;

impl CompaniesGridAdapter {
    // "Buildings" also resolves "# Buildings" through the substring fallback.
    const COLUMNS: &'static [&'static str] = &[
        "Company Name",
        "Buildings",
        "Account Manager",
        "Sales Rep",
        "Assigned To",
        "Sales Status",
    ];
}

impl SourceAdapter for CompaniesGridAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::CompaniesGrid
    }

    fn columns(&self) -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn ingest(&self, row: &RawRow, dataset: &mut SourceDataset) {
        let Some(name) = row.clean("Company Name") else {
            dataset.skipped_rows += 1;
            return;
        };
        let key = CompanyKey::derive(&name);
        let mut draft = CompanyDraft::new(name);
        draft.num_buildings = parse_count(row.get("Buildings"));
        draft.priority = Priority::from_building_count(draft.num_buildings);
        draft.account_manager = row.clean("Account Manager");
        draft.sales_rep = row.clean("Sales Rep");
        if let Some(sales_status) = row.clean("Sales Status") {
            draft
                .metadata
                .insert("sales_status".into(), JsonValue::String(sales_status));
        }
        if dataset.add_company(draft) {
            if let Some(caller) = row.clean("Assigned To") {
                dataset.assign_caller(key, caller);
            }
        }
    }
}

pub struct ContactsGridAdapter;

impl ContactsGridAdapter {
    const COLUMNS: &'static [&'static str] = &[
        "Full Name",
        "First",
        "Last",
        "Company",
        "Title",
        "Phone",
        "Phone2",
        "Email",
    ];
}

impl SourceAdapter for ContactsGridAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::ContactsGrid
    }

    fn columns(&self) -> &'static [&'static str] {
        Self::COLUMNS
    }

    fn ingest(&self, row: &RawRow, dataset: &mut SourceDataset) {
        let Some(company_name) = row.clean("Company") else {
            dataset.skipped_rows += 1;
            return;
        };
        let Some(name) = row
            .clean("Full Name")
            .or_else(|| full_name(row.get("First"), row.get("Last")))
        else {
            dataset.skipped_rows += 1;
            return;
        };
        dataset.contacts.push(ContactDraft {
            company_name,
            name,
            title: row.clean("Title"),
            phone: normalize_phone(row.get("Phone")),
            mobile: normalize_phone(row.get("Phone2")),
            email: first_email(row.get("Email")),
            notes: None,
        });
    }
}

pub fn adapter_for_kind(kind: SourceKind) -> Box<dyn SourceAdapter> {
    match kind {
        SourceKind::MasterList => Box::new(MasterListAdapter),
        SourceKind::CompaniesGrid => Box::new(CompaniesGridAdapter),
        SourceKind::ContactsGrid => Box::new(ContactsGridAdapter),
    }
}

fn ingest_rows<R: Read>(
    rows: RowIter<R>,
    adapter: &dyn SourceAdapter,
    mut dataset: SourceDataset,
) -> SourceDataset {
    dataset.header_ambiguities = rows.columns().ambiguities().to_vec();
    for row in rows {
        match row {
            Ok(row) => {
                dataset.rows_read += 1;
                adapter.ingest(&row, &mut dataset);
            }
            Err(err) => {
                warn!(source_id = %dataset.source_id, error = %err, "skipping unreadable row");
                dataset.row_errors.push(err.to_string());
            }
        }
    }
    info!(
        source_id = %dataset.source_id,
        rows = dataset.rows_read,
        companies = dataset.companies.len(),
        contacts = dataset.contacts.len(),
        callers = dataset.caller_assignments.len(),
        "source loaded"
    );
    dataset
}

pub fn load_source(
    source_id: &str,
    kind: SourceKind,
    path: impl AsRef<Path>,
) -> Result<SourceDataset, SourceError> {
    let adapter = adapter_for_kind(kind);
    let rows = read_rows(path, adapter.columns())?;
    Ok(ingest_rows(rows, adapter.as_ref(), SourceDataset::new(source_id, kind)))
}

pub fn load_source_from_reader<R: Read>(
    source_id: &str,
    kind: SourceKind,
    reader: R,
) -> Result<SourceDataset, SourceError> {
    let adapter = adapter_for_kind(kind);
    let rows = read_rows_from_reader(reader, source_id, adapter.columns())?;
    Ok(ingest_rows(rows, adapter.as_ref(), SourceDataset::new(source_id, kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn headers(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|h| normalize_header(h)).collect()
    }

    #[test]
    fn exact_header_beats_substring() {
        let headers = headers(&["Company Name", "Company"]);
        assert_eq!(resolve_header(&headers, "Company"), HeaderMatch::Exact(1));
    }

    #[test]
    fn byte_order_mark_is_ignored_for_exact_match() {
        let headers = headers(&["\u{feff}Company Name", "Sales Rep"]);
        assert_eq!(resolve_header(&headers, "Company Name"), HeaderMatch::Exact(0));
    }

    #[test]
    fn substring_fallback_handles_renamed_headers() {
        let headers = headers(&["Name", "# Buildings"]);
        assert_eq!(resolve_header(&headers, "Buildings"), HeaderMatch::Fallback(1));
        assert_eq!(resolve_header(&headers, "Caller"), HeaderMatch::Missing);
    }

    #[test]
    fn multiple_substring_matches_are_flagged() {
        let headers = headers(&["Old Company Name", "Company Name (new)"]);
        let found = resolve_header(&headers, "Company Name");
        assert_eq!(found.index(), Some(0));
        assert!(matches!(found, HeaderMatch::Ambiguous { ref candidates, .. } if candidates.len() == 2));

        let map = ColumnMap::new(["Old Company Name", "Company Name (new)"], &["Company Name"]);
        assert_eq!(map.ambiguities().len(), 1);
    }

    #[test]
    fn fallback_skips_headers_owned_by_another_column() {
        let map = ColumnMap::new(["Full Name", "Company", "Phone2"], &["Full Name", "Company", "Phone", "Phone2"]);
        assert_eq!(map.index_of("Phone"), None);
        assert_eq!(map.index_of("Phone2"), Some(2));

        let map = ColumnMap::new(["Company", "Sales Status"], &["Company", "Status", "Sales Status"]);
        assert_eq!(map.index_of("Status"), None);
        assert!(map.ambiguities().is_empty());
    }

    #[test]
    fn second_phone_column_only_fills_mobile() {
        let csv = "Full Name,Company,Phone2\nJo Smith,Acme Inc,555.123.4567\n";
        let dataset = load_source_from_reader("contacts", SourceKind::ContactsGrid, csv.as_bytes())
            .expect("dataset");
        let jo = &dataset.contacts[0];
        assert_eq!(jo.phone, None);
        assert_eq!(jo.mobile.as_deref(), Some("(555) 123-4567"));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let err = load_source("ghost", SourceKind::CompaniesGrid, "/definitely/not/here.csv")
            .expect_err("missing file");
        assert!(matches!(err, SourceError::SourceUnavailable { .. }));
    }

    #[test]
    fn rows_stream_in_file_order() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "Company Name,Sales Rep").expect("write");
        writeln!(file, "Beta LLC,Ann").expect("write");
        writeln!(file, "Acme Inc,Bob").expect("write");
        let names: Vec<String> = read_rows(file.path(), &["Company Name"])
            .expect("open")
            .map(|row| row.expect("row").clean("Company Name").expect("name"))
            .collect();
        assert_eq!(names, vec!["Beta LLC", "Acme Inc"]);
    }

    #[test]
    fn unreadable_row_does_not_abort_the_source() {
        let mut bytes = b"Company Name,Buildings\nAcme Inc,3\n".to_vec();
        bytes.extend_from_slice(b"Bad \xff\xfe Co,1\n");
        bytes.extend_from_slice(b"Beta LLC,12\n");
        let dataset = load_source_from_reader("grid", SourceKind::CompaniesGrid, bytes.as_slice())
            .expect("dataset");
        assert_eq!(dataset.row_errors.len(), 1);
        let names: Vec<&str> = dataset.companies.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Inc", "Beta LLC"]);
        assert_eq!(dataset.companies[1].priority, Priority::High);
    }

    #[test]
    fn master_list_collects_companies_callers_and_contacts() {
        let csv = "\
Company,Caller,Office Address,NumOfBuildings,First,Last,Title,Phone,Mobile,Email
Acme Inc,,12 Main St,4,Jane,Doe,Owner,718-258-5250,NULL,\"NULL, jane@acme.test\"
ACME INC ,Sam,,9,John,Roe,Manager,,,
Beta LLC,Alex,,NULL,NULL,NULL,,,,
";
        let dataset = load_source_from_reader("master", SourceKind::MasterList, csv.as_bytes())
            .expect("dataset");
        assert_eq!(dataset.companies.len(), 2);
        assert_eq!(dataset.duplicate_company_rows, 1);

        let acme = dataset
            .company(&CompanyKey::derive("acme inc"))
            .expect("acme");
        assert_eq!(acme.address.as_deref(), Some("12 Main St"));
        assert_eq!(acme.num_buildings, 4);
        assert_eq!(acme.assigned_to.as_deref(), Some("Sam"));
        assert_eq!(acme.status, CompanyStatus::InProgress);

        assert_eq!(dataset.contacts.len(), 2);
        assert_eq!(dataset.contacts[0].phone.as_deref(), Some("(718) 258-5250"));
        assert_eq!(dataset.contacts[0].email.as_deref(), Some("jane@acme.test"));
        assert_eq!(dataset.contacts[0].mobile, None);
        assert_eq!(
            dataset.caller_assignments.get(&CompanyKey::derive("Beta LLC")).map(String::as_str),
            Some("Alex")
        );
    }

    #[test]
    fn first_caller_wins_and_conflicts_are_counted() {
        let mut dataset = SourceDataset::new("master", SourceKind::MasterList);
        dataset.add_company(CompanyDraft::new("Acme Inc"));
        dataset.assign_caller(CompanyKey::derive("Acme Inc"), "Sam".into());
        dataset.assign_caller(CompanyKey::derive("acme inc"), "Alex".into());
        dataset.assign_caller(CompanyKey::derive("acme inc"), "Sam".into());
        assert_eq!(dataset.caller_conflicts, 1);
        assert_eq!(dataset.companies[0].assigned_to.as_deref(), Some("Sam"));
    }

    #[test]
    fn contacts_grid_falls_back_to_first_and_last() {
        let csv = "\u{feff}Full Name,First,Last,Company,Title,Phone,Phone2,Email\n\
,Jane,Doe,Acme Inc,Owner,(917) 418 6275,+44 20 7946 0958,jane@acme.test\n\
Harry Frankel,,,NULL,Owner,,,\n";
        let dataset = load_source_from_reader("contacts", SourceKind::ContactsGrid, csv.as_bytes())
            .expect("dataset");
        assert_eq!(dataset.contacts.len(), 1);
        assert_eq!(dataset.skipped_rows, 1);
        let jane = &dataset.contacts[0];
        assert_eq!(jane.name, "Jane Doe");
        assert_eq!(jane.phone.as_deref(), Some("(917) 418-6275"));
        assert_eq!(jane.mobile.as_deref(), Some("+44 20 7946 0958"));
        assert!(dataset.companies.is_empty());
        assert_eq!(dataset.contacts_by_company().len(), 1);
    }
}
