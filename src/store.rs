//! Locally persisted lists, notes, saved searches and enrichment results.
//!
//! Each namespace lives in a single blob under its own storage key. Every
//! mutation reads the whole blob, changes it in memory and writes the whole
//! blob back. There is no compare-and-swap: two processes writing the same
//! namespace race, and the last full snapshot written wins. Ids stored here are
//! never checked against the company catalog, and nothing cascades when a
//! company disappears from it.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::{Storage, StorageError};
use crate::models::{CachedEnrichment, EnrichmentResult, FilterSet, Note, SavedSearch};
use crate::query::Query;

pub type Lists = BTreeMap<String, Vec<i64>>;
pub type Notes = BTreeMap<i64, Note>;
pub type EnrichmentCache = BTreeMap<i64, CachedEnrichment>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Lists,
    Notes,
    Searches,
    EnrichmentCache,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Lists,
        Namespace::Notes,
        Namespace::Searches,
        Namespace::EnrichmentCache,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Namespace::Lists => "lists",
            Namespace::Notes => "notes",
            Namespace::Searches => "searches",
            Namespace::EnrichmentCache => "enrichment-cache",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Namespace::Lists => "scout.lists",
            Namespace::Notes => "scout.notes",
            Namespace::Searches => "scout.searches",
            Namespace::EnrichmentCache => "scout.enrichment-cache",
        }
    }
}

impl FromStr for Namespace {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.name() == s.trim())
            .ok_or_else(|| StoreError::UnknownNamespace(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Failed to serialize {namespace}: {source}")]
    Serialize {
        namespace: &'static str,
        source: serde_json::Error,
    },

    #[error("List name cannot be empty")]
    InvalidListName,

    #[error("Unknown namespace '{0}'. Available: lists, notes, searches, enrichment-cache")]
    UnknownNamespace(String),
}

pub struct Store<S: Storage> {
    storage: S,
}

impl<S: Storage> Store<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Reads a namespace. A missing blob and an unreadable blob both come back
    /// as the empty default.
    fn load<T: DeserializeOwned + Default>(&self, ns: Namespace) -> Result<T, StoreError> {
        let raw = match self.storage.get(ns.key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(T::default()),
            Err(StorageError::Corrupt { .. }) => {
                warn!(namespace = ns.key(), "undecodable blob, treating namespace as empty");
                return Ok(T::default());
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(namespace = ns.key(), error = %e, "corrupt blob, treating namespace as empty");
                Ok(T::default())
            }
        }
    }

    fn save<T: Serialize>(&self, ns: Namespace, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            namespace: ns.key(),
            source,
        })?;
        self.storage.set(ns.key(), &raw)?;
        Ok(())
    }

    pub fn clear(&self, ns: Namespace) -> Result<(), StoreError> {
        self.storage.delete(ns.key())?;
        Ok(())
    }

    // --- Lists ---

    pub fn lists(&self) -> Result<Lists, StoreError> {
        self.load(Namespace::Lists)
    }

    pub fn list(&self, name: &str) -> Result<Option<Vec<i64>>, StoreError> {
        Ok(self.lists()?.remove(name.trim()))
    }

    /// Returns `false` when the list already existed; its members are kept.
    pub fn create_list(&self, name: &str) -> Result<bool, StoreError> {
        let name = list_name(name)?;
        let mut lists = self.lists()?;
        if lists.contains_key(name) {
            return Ok(false);
        }
        lists.insert(name.to_string(), Vec::new());
        self.save(Namespace::Lists, &lists)?;
        Ok(true)
    }

    /// Adds a company to a list, creating the list if needed. Returns `false`
    /// when the company was already a member.
    pub fn save_to_list(&self, name: &str, company_id: i64) -> Result<bool, StoreError> {
        let name = list_name(name)?;
        let mut lists = self.lists()?;
        let members = lists.entry(name.to_string()).or_default();
        if members.contains(&company_id) {
            return Ok(false);
        }
        members.push(company_id);
        self.save(Namespace::Lists, &lists)?;
        debug!(list = name, company_id, "saved to list");
        Ok(true)
    }

    pub fn remove_from_list(&self, name: &str, company_id: i64) -> Result<bool, StoreError> {
        let mut lists = self.lists()?;
        let Some(members) = lists.get_mut(name.trim()) else {
            return Ok(false);
        };
        let before = members.len();
        members.retain(|id| *id != company_id);
        if members.len() == before {
            return Ok(false);
        }
        self.save(Namespace::Lists, &lists)?;
        Ok(true)
    }

    pub fn delete_list(&self, name: &str) -> Result<bool, StoreError> {
        let mut lists = self.lists()?;
        if lists.remove(name.trim()).is_none() {
            return Ok(false);
        }
        self.save(Namespace::Lists, &lists)?;
        Ok(true)
    }

    /// Deletes a list only if `confirm` agrees. `confirm` is not consulted for
    /// a list that does not exist.
    pub fn delete_list_confirmed<F>(&self, name: &str, confirm: F) -> Result<bool, StoreError>
    where
        F: FnOnce(&str) -> bool,
    {
        let name = name.trim();
        if self.list(name)?.is_none() || !confirm(name) {
            return Ok(false);
        }
        self.delete_list(name)
    }

    /// Names of every list holding `company_id`.
    pub fn lists_containing(&self, company_id: i64) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lists()?
            .into_iter()
            .filter(|(_, members)| members.contains(&company_id))
            .map(|(name, _)| name)
            .collect())
    }

    // --- Notes ---

    pub fn notes(&self) -> Result<Notes, StoreError> {
        self.load(Namespace::Notes)
    }

    pub fn note(&self, company_id: i64) -> Result<Option<Note>, StoreError> {
        Ok(self.notes()?.remove(&company_id))
    }

    pub fn save_note(&self, company_id: i64, content: &str) -> Result<Note, StoreError> {
        let mut notes = self.notes()?;
        let note = Note {
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        notes.insert(company_id, note.clone());
        self.save(Namespace::Notes, &notes)?;
        Ok(note)
    }

    pub fn delete_note(&self, company_id: i64) -> Result<bool, StoreError> {
        let mut notes = self.notes()?;
        if notes.remove(&company_id).is_none() {
            return Ok(false);
        }
        self.save(Namespace::Notes, &notes)?;
        Ok(true)
    }

    // --- Saved searches ---

    pub fn saved_searches(&self) -> Result<Vec<SavedSearch>, StoreError> {
        self.load(Namespace::Searches)
    }

    pub fn saved_search(&self, id: &str) -> Result<Option<SavedSearch>, StoreError> {
        Ok(self.saved_searches()?.into_iter().find(|s| s.id == id))
    }

    pub fn save_search(&self, query: &str, filters: &FilterSet) -> Result<SavedSearch, StoreError> {
        let mut searches = self.saved_searches()?;
        let search = SavedSearch {
            id: next_search_id(&searches),
            query: query.to_string(),
            filters: filters.clone(),
            saved_at: Utc::now(),
        };
        searches.push(search.clone());
        self.save(Namespace::Searches, &searches)?;
        Ok(search)
    }

    pub fn delete_saved_search(&self, id: &str) -> Result<bool, StoreError> {
        let mut searches = self.saved_searches()?;
        let before = searches.len();
        searches.retain(|s| s.id != id);
        if searches.len() == before {
            return Ok(false);
        }
        self.save(Namespace::Searches, &searches)?;
        Ok(true)
    }

    // --- Enrichment cache ---

    pub fn enrichment_cache(&self) -> Result<EnrichmentCache, StoreError> {
        self.load(Namespace::EnrichmentCache)
    }

    pub fn cached_enrichment(&self, company_id: i64) -> Result<Option<CachedEnrichment>, StoreError> {
        Ok(self.enrichment_cache()?.remove(&company_id))
    }

    pub fn cache_enrichment(
        &self,
        company_id: i64,
        result: EnrichmentResult,
    ) -> Result<CachedEnrichment, StoreError> {
        let mut cache = self.enrichment_cache()?;
        let entry = CachedEnrichment {
            result,
            cached_at: Utc::now(),
        };
        cache.insert(company_id, entry.clone());
        self.save(Namespace::EnrichmentCache, &cache)?;
        Ok(entry)
    }
}

fn list_name(name: &str) -> Result<&str, StoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::InvalidListName);
    }
    Ok(name)
}

static LAST_SEARCH_ID: AtomicI64 = AtomicI64::new(0);

/// Microsecond clock reading, bumped past every id handed out earlier in this
/// process and every numeric id already stored.
fn next_search_id(existing: &[SavedSearch]) -> String {
    let floor = existing
        .iter()
        .filter_map(|s| s.id.parse::<i64>().ok())
        .max()
        .unwrap_or(0);
    let now = Utc::now().timestamp_micros();

    let mut prev = LAST_SEARCH_ID.load(Ordering::SeqCst);
    loop {
        let next = now.max(prev + 1).max(floor + 1);
        match LAST_SEARCH_ID.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

impl SavedSearch {
    /// Re-opens the search on the first page with the default sort.
    pub fn to_query(&self) -> Query {
        Query {
            term: self.query.clone(),
            filters: self.filters.clone(),
            ..Default::default()
        }
    }
}
