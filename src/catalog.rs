use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

use crate::models::Company;

const SEED_COMPANIES: &str = include_str!("../data/companies.json");

/// The reference company collection. Read-only; lists, notes and cached
/// enrichments point into it by id but are never reconciled with it.
#[derive(Debug, Clone)]
pub struct Catalog {
    companies: Vec<Company>,
}

impl Catalog {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read companies file: {}", path.display()))?;
                Self::from_json(&raw)
                    .with_context(|| format!("Invalid companies file: {}", path.display()))
            }
            None => Self::seed(),
        }
    }

    pub fn seed() -> Result<Self> {
        Self::from_json(SEED_COMPANIES).context("Bundled company dataset is invalid")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let companies: Vec<Company> = serde_json::from_str(raw)?;
        Self::new(companies)
    }

    pub fn new(companies: Vec<Company>) -> Result<Self> {
        let mut seen = HashSet::new();
        for c in &companies {
            if !seen.insert(c.id) {
                bail!("Duplicate company id {}", c.id);
            }
        }
        Ok(Self { companies })
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }

    pub fn get(&self, id: i64) -> Option<&Company> {
        self.companies.iter().find(|c| c.id == id)
    }

    /// Companies whose ids appear in `ids`, in catalog order. Ids with no
    /// matching company are skipped.
    pub fn resolve(&self, ids: &[i64]) -> Vec<&Company> {
        self.companies.iter().filter(|c| ids.contains(&c.id)).collect()
    }

    /// Ids in `ids` that no longer match any company.
    pub fn dangling(&self, ids: &[i64]) -> Vec<i64> {
        ids.iter().copied().filter(|id| self.get(*id).is_none()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_dataset_loads() {
        let catalog = Catalog::seed().unwrap();
        assert!(catalog.len() >= 10);
        assert!(catalog.companies().iter().all(|c| !c.name.is_empty()));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let raw = r#"[
            {"id": 1, "name": "A", "industry": "AI", "location": "X", "founded": 2020, "employees": "1-10", "website": "a.com"},
            {"id": 1, "name": "B", "industry": "AI", "location": "X", "founded": 2020, "employees": "1-10", "website": "b.com"}
        ]"#;
        let err = Catalog::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("Duplicate company id 1"));
    }

    #[test]
    fn test_resolve_keeps_catalog_order_and_skips_dangling() {
        let catalog = Catalog::seed().unwrap();
        let first = catalog.companies()[0].id;
        let second = catalog.companies()[1].id;

        let resolved = catalog.resolve(&[second, 999_999, first]);
        let ids: Vec<i64> = resolved.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![first, second]);
        assert_eq!(catalog.dangling(&[second, 999_999, first]), vec![999_999]);
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = Catalog::load(Some(Path::new("/definitely/not/here.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read companies file"));
    }
}
