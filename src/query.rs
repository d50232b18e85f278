use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::models::{Company, FilterSet};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown sort key '{0}'. Available: name, industry, location, founded, employees")]
    UnknownSortKey(String),

    #[error("Unknown sort direction '{0}'. Use 'asc' or 'desc'")]
    UnknownSortDirection(String),

    #[error("Page size must be at least 1")]
    InvalidPageSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    #[default]
    Name,
    Industry,
    Location,
    Founded,
    Employees,
}

impl FromStr for SortKey {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(SortKey::Name),
            "industry" => Ok(SortKey::Industry),
            "location" => Ok(SortKey::Location),
            "founded" => Ok(SortKey::Founded),
            "employees" => Ok(SortKey::Employees),
            _ => Err(QueryError::UnknownSortKey(s.to_string())),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SortKey::Name => "name",
            SortKey::Industry => "industry",
            SortKey::Location => "location",
            SortKey::Founded => "founded",
            SortKey::Employees => "employees",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        })
    }
}

impl FromStr for SortDirection {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            _ => Err(QueryError::UnknownSortDirection(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

/// Everything needed to produce one page of results.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub term: String,
    pub filters: FilterSet,
    pub sort: SortSpec,
    pub page: i64,
    pub page_size: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            term: String::new(),
            filters: FilterSet::default(),
            sort: SortSpec::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryPage<'a> {
    pub items: Vec<&'a Company>,
    /// Matches across all pages.
    pub total: usize,
    /// Page actually served, after clamping.
    pub page: i64,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Case-insensitive substring match over name, description and industry.
/// A blank term matches everything.
pub fn search<'a>(companies: impl IntoIterator<Item = &'a Company>, term: &str) -> Vec<&'a Company> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return companies.into_iter().collect();
    }

    companies
        .into_iter()
        .filter(|c| {
            c.name.to_lowercase().contains(&term)
                || c.description.to_lowercase().contains(&term)
                || c.industry.to_lowercase().contains(&term)
        })
        .collect()
}

pub fn filter<'a>(
    companies: impl IntoIterator<Item = &'a Company>,
    filters: &FilterSet,
) -> Vec<&'a Company> {
    companies
        .into_iter()
        .filter(|c| {
            admits(&filters.industries, &c.industry)
                && admits(&filters.locations, &c.location)
                && admits(&filters.employees, &c.employees)
        })
        .collect()
}

fn admits(set: &BTreeSet<String>, value: &str) -> bool {
    set.is_empty() || set.contains(value)
}

/// Stable sort: companies comparing equal keep their input order in both
/// directions.
pub fn sort<'a>(mut companies: Vec<&'a Company>, spec: SortSpec) -> Vec<&'a Company> {
    companies.sort_by(|a, b| {
        let ord = compare(a, b, spec.key);
        match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        }
    });
    companies
}

fn compare(a: &Company, b: &Company, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => cmp_ignore_case(&a.name, &b.name),
        SortKey::Industry => cmp_ignore_case(&a.industry, &b.industry),
        SortKey::Location => cmp_ignore_case(&a.location, &b.location),
        SortKey::Employees => cmp_ignore_case(&a.employees, &b.employees),
        SortKey::Founded => a.founded.cmp(&b.founded),
    }
}

fn cmp_ignore_case(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// 1-indexed page slice. Pages below 1 are clamped to 1; pages past the end
/// yield an empty slice.
pub fn paginate<T>(items: &[T], page: i64, page_size: usize) -> Result<&[T], QueryError> {
    if page_size == 0 {
        return Err(QueryError::InvalidPageSize);
    }
    let page = clamp_page(page);
    let start = ((page - 1) as usize).saturating_mul(page_size);
    if start >= items.len() {
        return Ok(&[]);
    }
    let end = start.saturating_add(page_size).min(items.len());
    Ok(&items[start..end])
}

fn clamp_page(page: i64) -> i64 {
    page.max(1)
}

pub fn total_pages(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// search -> filter -> sort -> paginate.
pub fn run<'a>(companies: &'a [Company], query: &Query) -> Result<QueryPage<'a>, QueryError> {
    let matched = search(companies, &query.term);
    let filtered = filter(matched, &query.filters);
    let sorted = sort(filtered, query.sort);

    let page = clamp_page(query.page);
    let items = paginate(&sorted, page, query.page_size)?.to_vec();

    Ok(QueryPage {
        items,
        total: sorted.len(),
        page,
        page_size: query.page_size,
        total_pages: total_pages(sorted.len(), query.page_size),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Facets {
    pub industries: Vec<String>,
    pub locations: Vec<String>,
    pub employees: Vec<String>,
}

/// Distinct values per filter dimension, sorted.
pub fn facets<'a>(companies: impl IntoIterator<Item = &'a Company>) -> Facets {
    let mut industries = BTreeSet::new();
    let mut locations = BTreeSet::new();
    let mut employees = BTreeSet::new();
    for c in companies {
        industries.insert(c.industry.clone());
        locations.insert(c.location.clone());
        employees.insert(c.employees.clone());
    }
    Facets {
        industries: industries.into_iter().collect(),
        locations: locations.into_iter().collect(),
        employees: employees.into_iter().collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub industries: usize,
    pub locations: usize,
    pub avg_founded: Option<i32>,
}

pub fn summarize(companies: &[&Company]) -> Summary {
    let facets = facets(companies.iter().copied());
    let avg_founded = if companies.is_empty() {
        None
    } else {
        let sum: i64 = companies.iter().map(|c| c.founded as i64).sum();
        Some((sum as f64 / companies.len() as f64).round() as i32)
    };
    Summary {
        total: companies.len(),
        industries: facets.industries.len(),
        locations: facets.locations.len(),
        avg_founded,
    }
}
