use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub industry: String,
    pub location: String,
    pub founded: i32,
    pub employees: String, // range label, e.g. "11-50"
    pub website: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default)]
    pub description: String,
}

/// Inclusion sets per dimension. An empty set places no restriction on that
/// dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSet {
    #[serde(default)]
    pub industries: BTreeSet<String>,
    #[serde(default)]
    pub locations: BTreeSet<String>,
    #[serde(default)]
    pub employees: BTreeSet<String>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.industries.is_empty() && self.locations.is_empty() && self.employees.is_empty()
    }

    /// Human summary of the non-empty dimensions, e.g. `["2 industries", "1 sizes"]`.
    pub fn active_dimensions(&self) -> Vec<String> {
        let mut parts = Vec::new();
        if !self.industries.is_empty() {
            parts.push(format!("{} industries", self.industries.len()));
        }
        if !self.locations.is_empty() {
            parts.push(format!("{} locations", self.locations.len()));
        }
        if !self.employees.is_empty() {
            parts.push(format!("{} sizes", self.employees.len()));
        }
        parts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: String,
    pub query: String,
    pub filters: FilterSet,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub fetched_at: String, // as sent by the backend, not reparsed
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub summary: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub signals: Vec<Signal>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEnrichment {
    #[serde(flatten)]
    pub result: EnrichmentResult,
    pub cached_at: DateTime<Utc>,
}
