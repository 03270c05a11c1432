//! Multi-index contact cache.
//!
//! An in-memory, file-persisted store of counterparties confirmed by the
//! accounting platform, indexed by normalized tax id (prefixed and
//! digits-only), normalized company name, and email. Every non-empty key
//! maps to exactly one current contact id; `upsert` removes the previous
//! version's index entries before re-indexing, so stale keys never leak.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::company::normalize_company_name;
use crate::error::CacheError;
use crate::models::contact::{CachedContact, PartyType};
use crate::taxid;

/// Search criteria for a cache lookup. Keys are consulted in priority order:
/// tax id, then company name, then email — never combined.
#[derive(Debug, Clone, Default)]
pub struct LookupQuery {
    pub tax_id: Option<String>,
    pub company_name: Option<String>,
    pub email: Option<String>,
}

/// What a cache lookup concluded about a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLookupStatus {
    /// Found by tax id, or by name with agreeing tax ids.
    ExactMatch,
    /// Found by name/email, but the cached record carries a different tax id.
    TaxIdConflict,
    /// Found by name/email; one side is missing the tax id.
    MissingTaxId,
    /// Nothing matched.
    NotFound,
}

/// What the caller should do about the supplier, derived from the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    UseExisting,
    UpdateContact,
    ResolveConflict,
    CreateContact,
}

/// Result of a prioritized cache lookup.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub status: CacheLookupStatus,
    pub contact: Option<CachedContact>,
}

impl CacheLookup {
    /// Map the lookup status onto the caller-facing action.
    pub fn recommended_action(&self) -> RecommendedAction {
        match self.status {
            CacheLookupStatus::ExactMatch => RecommendedAction::UseExisting,
            CacheLookupStatus::MissingTaxId => RecommendedAction::UpdateContact,
            CacheLookupStatus::TaxIdConflict => RecommendedAction::ResolveConflict,
            CacheLookupStatus::NotFound => RecommendedAction::CreateContact,
        }
    }
}

/// Persisted shape: the record map plus all index maps.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    contacts: HashMap<String, CachedContact>,
    #[serde(default)]
    tax_index: HashMap<String, String>,
    #[serde(default)]
    tax_digits_index: HashMap<String, String>,
    #[serde(default)]
    company_index: HashMap<String, Vec<String>>,
    #[serde(default)]
    email_index: HashMap<String, String>,
}

/// Cache statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_contacts: usize,
    pub contacts_with_tax_id: usize,
    pub customers: usize,
    pub vendors: usize,
}

/// In-memory contact cache with file persistence.
pub struct ContactCache {
    cache_file: PathBuf,
    contacts: HashMap<String, CachedContact>,
    tax_index: HashMap<String, String>,
    tax_digits_index: HashMap<String, String>,
    company_index: HashMap<String, Vec<String>>,
    email_index: HashMap<String, String>,
}

impl ContactCache {
    /// Create an empty cache bound to a persistence path.
    pub fn new(cache_file: impl Into<PathBuf>) -> Self {
        Self {
            cache_file: cache_file.into(),
            contacts: HashMap::new(),
            tax_index: HashMap::new(),
            tax_digits_index: HashMap::new(),
            company_index: HashMap::new(),
            email_index: HashMap::new(),
        }
    }

    /// Load the cache from its file.
    ///
    /// A missing or corrupt file yields an empty cache with a logged warning
    /// — never a half-populated one, and never a startup failure. A valid
    /// file with absent index maps gets its indexes rebuilt from the records.
    pub fn load(cache_file: impl Into<PathBuf>) -> Self {
        let path: PathBuf = cache_file.into();
        let mut cache = Self::new(path.clone());

        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("no cache file at {}, starting empty", path.display());
                return cache;
            }
            Err(e) => {
                warn!("failed to read cache file {}: {}, starting empty", path.display(), e);
                return cache;
            }
        };

        let parsed: CacheFile = match serde_json::from_str(&content) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("corrupt cache file {}: {}, starting empty", path.display(), e);
                return cache;
            }
        };

        let indexes_present = !parsed.tax_index.is_empty()
            || !parsed.company_index.is_empty()
            || !parsed.email_index.is_empty();

        cache.contacts = parsed.contacts;
        if indexes_present {
            cache.tax_index = parsed.tax_index;
            cache.tax_digits_index = parsed.tax_digits_index;
            cache.company_index = parsed.company_index;
            cache.email_index = parsed.email_index;
        } else if !cache.contacts.is_empty() {
            info!("cache file has no indexes, rebuilding from records");
            let records: Vec<CachedContact> = cache.contacts.values().cloned().collect();
            for record in records {
                cache.add_indexes(&record);
            }
        }

        info!("contact cache loaded: {} contacts", cache.contacts.len());
        cache
    }

    /// Persist the full record map and index maps as JSON.
    ///
    /// In-memory state is untouched regardless of outcome; callers log the
    /// error and carry on.
    pub fn save(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.cache_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CacheError::Write(e.to_string()))?;
            }
        }

        let file = CacheFile {
            contacts: self.contacts.clone(),
            tax_index: self.tax_index.clone(),
            tax_digits_index: self.tax_digits_index.clone(),
            company_index: self.company_index.clone(),
            email_index: self.email_index.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CacheError::Write(e.to_string()))?;
        std::fs::write(&self.cache_file, json).map_err(|e| CacheError::Write(e.to_string()))?;

        info!(
            "contact cache saved: {} contacts to {}",
            self.contacts.len(),
            self.cache_file.display()
        );
        Ok(())
    }

    /// Path of the persisted file.
    pub fn path(&self) -> &Path {
        &self.cache_file
    }

    /// Insert or replace a contact, keeping indexes consistent.
    ///
    /// Records are replaced wholesale: the previous version's index entries
    /// are removed before the new ones are written, so a rename or tax-id
    /// change cannot leave a stale key behind.
    pub fn upsert(&mut self, record: CachedContact) {
        if let Some(old) = self.contacts.remove(&record.contact_id) {
            self.remove_indexes(&old);
        }
        self.add_indexes(&record);
        self.contacts.insert(record.contact_id.clone(), record);
    }

    /// Bulk insert from a platform refresh.
    pub fn upsert_all(&mut self, records: Vec<CachedContact>) {
        for record in records {
            self.upsert(record);
        }
    }

    /// Fetch a contact by its platform id.
    pub fn get(&self, contact_id: &str) -> Option<&CachedContact> {
        self.contacts.get(contact_id)
    }

    /// Search by tax id, accepting both prefixed and bare-digit forms.
    pub fn search_by_tax_id(&self, tax_id: &str) -> Option<&CachedContact> {
        if tax_id.trim().is_empty() {
            return None;
        }
        let normalized = taxid::normalize(tax_id);
        let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();

        if let Some(id) = self.tax_index.get(&normalized) {
            return self.contacts.get(id);
        }
        if !digits.is_empty() {
            if let Some(id) = self.tax_digits_index.get(&digits) {
                return self.contacts.get(id);
            }
        }
        None
    }

    /// Search by company name (normalized comparison).
    pub fn search_by_company(&self, company_name: &str) -> Vec<&CachedContact> {
        let key = normalize_company_name(company_name);
        if key.is_empty() {
            return Vec::new();
        }
        self.company_index
            .get(&key)
            .map(|ids| ids.iter().filter_map(|id| self.contacts.get(id)).collect())
            .unwrap_or_default()
    }

    /// Search by email (case-insensitive).
    pub fn search_by_email(&self, email: &str) -> Option<&CachedContact> {
        if email.trim().is_empty() {
            return None;
        }
        self.email_index
            .get(&email.trim().to_lowercase())
            .and_then(|id| self.contacts.get(id))
    }

    /// Prioritized lookup: tax id > company name > email, falling through in
    /// that order without combining scores across key types.
    pub fn lookup(&self, query: &LookupQuery) -> CacheLookup {
        let query_tax = query
            .tax_id
            .as_deref()
            .map(taxid::normalize)
            .filter(|s| !s.is_empty());

        if let Some(tax) = &query_tax {
            if let Some(contact) = self.search_by_tax_id(tax) {
                return CacheLookup {
                    status: CacheLookupStatus::ExactMatch,
                    contact: Some(contact.clone()),
                };
            }
        }

        let by_name = query
            .company_name
            .as_deref()
            .map(|name| self.search_by_company(name))
            .unwrap_or_default()
            .first()
            .copied()
            .cloned();
        let found = match by_name {
            Some(contact) => Some(contact),
            None => query
                .email
                .as_deref()
                .and_then(|email| self.search_by_email(email))
                .cloned(),
        };

        let Some(contact) = found else {
            return CacheLookup { status: CacheLookupStatus::NotFound, contact: None };
        };

        let cached_tax = contact
            .tax_id
            .as_deref()
            .map(taxid::normalize)
            .filter(|s| !s.is_empty());

        let status = match (&query_tax, &cached_tax) {
            (Some(a), Some(b)) => {
                if tax_digits_equal(a, b) {
                    CacheLookupStatus::ExactMatch
                } else {
                    CacheLookupStatus::TaxIdConflict
                }
            }
            (None, None) | (Some(_), None) | (None, Some(_)) => CacheLookupStatus::MissingTaxId,
        };

        CacheLookup { status, contact: Some(contact) }
    }

    /// Summary counts.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_contacts: self.contacts.len(),
            contacts_with_tax_id: self
                .contacts
                .values()
                .filter(|c| c.tax_id.as_deref().is_some_and(|t| !t.is_empty()))
                .count(),
            customers: self
                .contacts
                .values()
                .filter(|c| c.party_type == PartyType::Customer)
                .count(),
            vendors: self
                .contacts
                .values()
                .filter(|c| c.party_type == PartyType::Vendor)
                .count(),
        }
    }

    /// Number of cached contacts.
    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    #[cfg(test)]
    fn index_cardinality_for(&self, contact_id: &str) -> usize {
        self.tax_index.values().filter(|id| id.as_str() == contact_id).count()
            + self
                .tax_digits_index
                .values()
                .filter(|id| id.as_str() == contact_id)
                .count()
            + self
                .company_index
                .values()
                .map(|ids| ids.iter().filter(|id| id.as_str() == contact_id).count())
                .sum::<usize>()
            + self.email_index.values().filter(|id| id.as_str() == contact_id).count()
    }

    fn add_indexes(&mut self, record: &CachedContact) {
        if let Some(tax) = record.tax_id.as_deref() {
            let normalized = taxid::normalize(tax);
            let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();
            if !normalized.is_empty() {
                self.tax_index.insert(normalized, record.contact_id.clone());
            }
            if !digits.is_empty() {
                self.tax_digits_index.insert(digits, record.contact_id.clone());
            }
        }

        let name_key = normalize_company_name(&record.company_name);
        if !name_key.is_empty() {
            let ids = self.company_index.entry(name_key).or_default();
            if !ids.contains(&record.contact_id) {
                ids.push(record.contact_id.clone());
            }
        }

        if !record.email.trim().is_empty() {
            self.email_index
                .insert(record.email.trim().to_lowercase(), record.contact_id.clone());
        }
    }

    fn remove_indexes(&mut self, record: &CachedContact) {
        if let Some(tax) = record.tax_id.as_deref() {
            let normalized = taxid::normalize(tax);
            let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();
            if self.tax_index.get(&normalized).map(String::as_str) == Some(&record.contact_id) {
                self.tax_index.remove(&normalized);
            }
            if self.tax_digits_index.get(&digits).map(String::as_str)
                == Some(&record.contact_id)
            {
                self.tax_digits_index.remove(&digits);
            }
        }

        let name_key = normalize_company_name(&record.company_name);
        if let Some(ids) = self.company_index.get_mut(&name_key) {
            ids.retain(|id| id != &record.contact_id);
            if ids.is_empty() {
                self.company_index.remove(&name_key);
            }
        }

        let email_key = record.email.trim().to_lowercase();
        if self.email_index.get(&email_key).map(String::as_str) == Some(&record.contact_id) {
            self.email_index.remove(&email_key);
        }
    }
}

/// Digits-only tax comparison: "PL9512495127" and "9512495127" agree.
fn tax_digits_equal(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let digits = |s: &str| -> String { s.chars().filter(char::is_ascii_digit).collect() };
    let (da, db) = (digits(a), digits(b));
    !da.is_empty() && da == db
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::contact::ContactAddress;
    use pretty_assertions::assert_eq;

    fn contact(id: &str, company: &str, tax: Option<&str>, email: &str) -> CachedContact {
        CachedContact {
            contact_id: id.to_string(),
            display_name: company.to_string(),
            company_name: company.to_string(),
            email: email.to_string(),
            tax_id: tax.map(str::to_string),
            party_type: PartyType::Vendor,
            billing_address: ContactAddress::default(),
            shipping_address: ContactAddress::default(),
            phone: None,
            contact_person: None,
            notes: None,
            organization_id: "20082562863".to_string(),
            last_modified: "2025-08-16T23:47:21+0200".to_string(),
        }
    }

    #[test]
    fn test_search_by_tax_id_prefixed_and_bare() {
        let mut cache = ContactCache::new("unused.json");
        cache.upsert(contact("c1", "Hibispol Sp. z o.o.", Some("PL9512495127"), ""));

        let by_prefixed = cache.search_by_tax_id("PL9512495127").unwrap();
        let by_bare = cache.search_by_tax_id("9512495127").unwrap();
        assert_eq!(by_prefixed.contact_id, by_bare.contact_id);
    }

    #[test]
    fn test_upsert_replaces_indexes_wholesale() {
        let mut cache = ContactCache::new("unused.json");

        cache.upsert(contact("c1", "Old Name GmbH", Some("DE123456789"), "old@x.de"));
        // Same contact id, every key changed.
        cache.upsert(contact("c1", "New Name GmbH", Some("DE987654321"), "new@x.de"));
        cache.upsert(contact("c1", "New Name GmbH", Some("DE987654321"), "new@x.de"));

        assert_eq!(cache.len(), 1);
        // One tax key + one digits key + one name key + one email key.
        assert_eq!(cache.index_cardinality_for("c1"), 4);
        assert!(cache.search_by_tax_id("DE123456789").is_none());
        assert!(cache.search_by_email("old@x.de").is_none());
        assert!(cache.search_by_company("Old Name GmbH").is_empty());
        assert!(cache.search_by_tax_id("DE987654321").is_some());
    }

    #[test]
    fn test_lookup_priority_and_statuses() {
        let mut cache = ContactCache::new("unused.json");
        cache.upsert(contact("c1", "Hibispol Sp. z o.o.", Some("PL9512495127"), "biuro@hibispol.pl"));
        cache.upsert(contact("c2", "Anysphere, Inc.", None, "ar@anysphere.co"));

        // Tax id wins outright.
        let hit = cache.lookup(&LookupQuery {
            tax_id: Some("9512495127".to_string()),
            company_name: Some("Anysphere, Inc.".to_string()),
            email: None,
        });
        assert_eq!(hit.status, CacheLookupStatus::ExactMatch);
        assert_eq!(hit.contact.unwrap().contact_id, "c1");

        // Name hit with a conflicting document tax id.
        let conflict = cache.lookup(&LookupQuery {
            tax_id: Some("PL5272956146".to_string()),
            company_name: Some("Hibispol Sp. z o.o.".to_string()),
            email: None,
        });
        assert_eq!(conflict.status, CacheLookupStatus::TaxIdConflict);
        assert_eq!(conflict.recommended_action(), RecommendedAction::ResolveConflict);

        // Name hit where the cached record has no tax id.
        let missing = cache.lookup(&LookupQuery {
            tax_id: Some("US874436547".to_string()),
            company_name: Some("Anysphere Inc".to_string()),
            email: None,
        });
        assert_eq!(missing.status, CacheLookupStatus::MissingTaxId);
        assert_eq!(missing.recommended_action(), RecommendedAction::UpdateContact);

        // Email fallback.
        let by_email = cache.lookup(&LookupQuery {
            tax_id: None,
            company_name: None,
            email: Some("AR@anysphere.co".to_string()),
        });
        assert_eq!(by_email.status, CacheLookupStatus::MissingTaxId);
        assert_eq!(by_email.contact.unwrap().contact_id, "c2");

        // Nothing at all.
        let nothing = cache.lookup(&LookupQuery::default());
        assert_eq!(nothing.status, CacheLookupStatus::NotFound);
        assert_eq!(nothing.recommended_action(), RecommendedAction::CreateContact);
    }

    #[test]
    fn test_absent_keys_return_not_found() {
        let cache = ContactCache::new("unused.json");
        assert!(cache.search_by_tax_id("PL0000000000").is_none());
        assert!(cache.search_by_company("Nobody").is_empty());
        assert!(cache.search_by_email("no@where.eu").is_none());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ContactCache::new(&path);
        cache.upsert(contact("c1", "Hibispol Sp. z o.o.", Some("PL9512495127"), "biuro@hibispol.pl"));
        cache.save().unwrap();

        let loaded = ContactCache::load(&path);
        assert_eq!(loaded.len(), 1);
        assert!(loaded.search_by_tax_id("9512495127").is_some());
        assert!(loaded.search_by_email("biuro@hibispol.pl").is_some());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{ not json").unwrap();

        let cache = ContactCache::load(&path);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_index_rebuild_when_file_has_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = ContactCache::new(&path);
        cache.upsert(contact("c1", "Hibispol Sp. z o.o.", Some("PL9512495127"), ""));
        let json = serde_json::json!({
            "contacts": { "c1": serde_json::to_value(cache.get("c1").unwrap()).unwrap() }
        });
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let loaded = ContactCache::load(&path);
        assert!(loaded.search_by_tax_id("PL9512495127").is_some());
    }

    #[test]
    fn test_stats() {
        let mut cache = ContactCache::new("unused.json");
        cache.upsert(contact("c1", "A", Some("PL9512495127"), ""));
        cache.upsert(contact("c2", "B", None, ""));

        let stats = cache.stats();
        assert_eq!(stats.total_contacts, 2);
        assert_eq!(stats.contacts_with_tax_id, 1);
        assert_eq!(stats.vendors, 2);
    }
}
