mod catalog;
mod config;
mod db;
mod enrich;
mod export;
mod models;
mod query;
mod store;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use catalog::Catalog;
use config::Config;
use db::SqliteStorage;
use enrich::{enrich_company, EnrichOutcome, Enricher, DEFAULT_API_URL, DEFAULT_TIMEOUT};
use models::{CachedEnrichment, Company, FilterSet};
use query::{Query, QueryPage, SortDirection, SortKey, SortSpec, DEFAULT_PAGE_SIZE};
use store::{Namespace, Store};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Company discovery for investors - search, shortlist, annotate, and enrich")]
struct Cli {
    /// Directory holding scout.db
    #[arg(long, global = true, env = "SCOUT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// JSON file with the company collection (defaults to the bundled dataset)
    #[arg(long, global = true, env = "SCOUT_COMPANIES")]
    companies: Option<PathBuf>,

    /// Base URL of the enrichment service
    #[arg(long, global = true, env = "SCOUT_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Enrichment request timeout in seconds
    #[arg(long, global = true, env = "SCOUT_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT.as_secs())]
    timeout_secs: u64,

    /// Cap scout.db at this many pages; writes past it fail as quota errors
    #[arg(long, global = true, env = "SCOUT_MAX_DB_PAGES")]
    max_db_pages: Option<i64>,

    /// Debug logging (SCOUT_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Free-text search over name, description and industry
    query: Option<String>,

    /// Only these industries (repeatable)
    #[arg(short, long = "industry")]
    industries: Vec<String>,

    /// Only these locations (repeatable)
    #[arg(short, long = "location")]
    locations: Vec<String>,

    /// Only these employee ranges, e.g. 11-50 (repeatable)
    #[arg(short, long = "employees")]
    employees: Vec<String>,
}

impl FilterArgs {
    fn filter_set(&self) -> FilterSet {
        FilterSet {
            industries: self.industries.iter().cloned().collect(),
            locations: self.locations.iter().cloned().collect(),
            employees: self.employees.iter().cloned().collect(),
        }
    }

    fn term(&self) -> String {
        self.query.clone().unwrap_or_default()
    }
}

#[derive(Args, Debug)]
struct PageArgs {
    /// Sort key (name, industry, location, founded, employees)
    #[arg(short, long, default_value = "name")]
    sort: String,

    /// Sort direction (asc, desc)
    #[arg(short, long, default_value = "asc")]
    direction: String,

    /// Page number, starting at 1
    #[arg(short, long, default_value = "1", allow_negative_numbers = true)]
    page: i64,

    /// Companies per page
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl PageArgs {
    fn sort_spec(&self) -> Result<SortSpec> {
        let key: SortKey = self.sort.parse()?;
        let direction: SortDirection = self.direction.parse()?;
        Ok(SortSpec::new(key, direction))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Search, filter, sort and page through companies
    Companies {
        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        page: PageArgs,

        /// Save this search (query and filters)
        #[arg(long)]
        save: bool,
    },

    /// Show the values available for each filter
    Facets,

    /// Summary statistics for a search
    Stats {
        #[command(flatten)]
        filters: FilterArgs,
    },

    /// Show a company profile with notes, lists and enrichment
    Show {
        /// Company ID
        id: i64,
    },

    /// Summarize a company's website via the enrichment service
    Enrich {
        /// Company ID
        id: i64,

        /// Fetch again even if a cached result exists
        #[arg(short, long)]
        force: bool,
    },

    /// Manage company lists
    List {
        #[command(subcommand)]
        command: ListCommands,
    },

    /// Manage company notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Manage saved searches
    Search {
        #[command(subcommand)]
        command: SearchCommands,
    },

    /// Clear one stored namespace (lists, notes, searches, enrichment-cache)
    Reset {
        /// Namespace to clear
        namespace: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ListCommands {
    /// Show all lists with member counts
    All,

    /// Create an empty list
    Create {
        /// List name
        name: String,
    },

    /// Add a company to a list (creates the list if needed)
    Add {
        /// List name
        name: String,
        /// Company ID
        id: i64,
    },

    /// Remove a company from a list
    Remove {
        /// List name
        name: String,
        /// Company ID
        id: i64,
    },

    /// Delete a list
    Delete {
        /// List name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the companies in a list
    Show {
        /// List name
        name: String,
    },

    /// Export a list as CSV
    Export {
        /// List name
        name: String,

        /// Output file (defaults to <list>-companies.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export every list as one CSV
    ExportAll {
        /// Output file (defaults to all-lists-export.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Write the note for a company, replacing any previous one
    Set {
        /// Company ID
        id: i64,
        /// Note text
        content: String,
    },

    /// Show the note for a company
    Show {
        /// Company ID
        id: i64,
    },

    /// Delete the note for a company
    Delete {
        /// Company ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum SearchCommands {
    /// List saved searches
    List,

    /// Run a saved search
    Run {
        /// Saved search ID
        id: String,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Delete a saved search
    Delete {
        /// Saved search ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_logging(cli.verbose);

    let config = Config::resolve(
        cli.data_dir,
        cli.companies,
        cli.api_url,
        cli.timeout_secs,
        cli.max_db_pages,
    )?;
    let catalog = Catalog::load(config.companies_path())?;
    let storage = SqliteStorage::open(&config.db_path())
        .with_context(|| format!("Failed to open {}", config.db_path().display()))?;
    if let Some(pages) = config.max_db_pages {
        let applied = storage.set_max_page_count(pages)?;
        tracing::debug!(requested = pages, applied, "database page cap");
    }
    let store = Store::new(storage);

    match cli.command {
        Commands::Companies { filters, page, save } => {
            let query = Query {
                term: filters.term(),
                filters: filters.filter_set(),
                sort: page.sort_spec()?,
                page: page.page,
                page_size: page.page_size,
            };
            let result = query::run(catalog.companies(), &query)?;
            print_page(&result, &query);

            if save {
                let saved = store.save_search(&query.term, &query.filters)?;
                println!("\nSaved search #{}", saved.id);
            }
        }

        Commands::Facets => {
            let facets = query::facets(catalog.companies());
            println!("Companies:  {}", catalog.len());
            println!("Industries: {}", facets.industries.join(", "));
            println!("Locations:  {}", facets.locations.join(", "));
            println!("Employees:  {}", facets.employees.join(", "));
        }

        Commands::Stats { filters } => {
            let matched = query::search(catalog.companies(), &filters.term());
            let matched = query::filter(matched, &filters.filter_set());
            let summary = query::summarize(&matched);
            println!("Total companies:   {}", summary.total);
            println!("Industries:        {}", summary.industries);
            println!("Locations:         {}", summary.locations);
            match summary.avg_founded {
                Some(year) => println!("Avg. founded year: {}", year),
                None => println!("Avg. founded year: -"),
            }
        }

        Commands::Show { id } => {
            let company = find_company(&catalog, id)?;
            print_company(company);

            let lists = store.lists_containing(id)?;
            if lists.is_empty() {
                println!("Lists: (none)");
            } else {
                println!("Lists: {}", lists.join(", "));
            }

            if let Some(note) = store.note(id)? {
                println!("\n--- Note ({}) ---", note.timestamp.format("%Y-%m-%d %H:%M"));
                println!("{}", note.content);
            }

            if let Some(cached) = store.cached_enrichment(id)? {
                println!();
                print_enrichment(&cached);
            }
        }

        Commands::Enrich { id, force } => {
            let company = find_company(&catalog, id)?;
            let enricher = Enricher::new(&config.api_url, config.timeout)?;
            tracing::debug!(endpoint = %enricher.endpoint(), "using enrichment service");

            println!("Enriching {} ({})... press Ctrl-C to cancel", company.name, company.website);
            let cancel = async {
                let _ = tokio::signal::ctrl_c().await;
            };

            match enrich_company(&enricher, &store, company, force, cancel).await? {
                EnrichOutcome::Fresh(cached) => print_enrichment(&cached),
                EnrichOutcome::Cached(cached) => {
                    print_enrichment(&cached);
                    println!("\n(cached result, use --force to re-enrich)");
                }
                EnrichOutcome::Cancelled => println!("Enrichment cancelled."),
            }
        }

        Commands::List { command } => match command {
            ListCommands::All => {
                let lists = store.lists()?;
                if lists.is_empty() {
                    println!("No lists yet. Create one with: scout list create <name>");
                } else {
                    println!("{:<30} {:>9}", "LIST", "COMPANIES");
                    println!("{}", "-".repeat(40));
                    for (name, ids) in &lists {
                        println!("{:<30} {:>9}", truncate(name, 28), ids.len());
                    }
                }
            }

            ListCommands::Create { name } => {
                if store.create_list(&name)? {
                    println!("Created list '{}'.", name.trim());
                } else {
                    println!("List '{}' already exists.", name.trim());
                }
            }

            ListCommands::Add { name, id } => {
                let company = find_company(&catalog, id)?;
                if store.save_to_list(&name, id)? {
                    println!("Added {} to '{}'.", company.name, name.trim());
                } else {
                    println!("{} is already in '{}'.", company.name, name.trim());
                }
            }

            ListCommands::Remove { name, id } => {
                if store.remove_from_list(&name, id)? {
                    println!("Removed #{} from '{}'.", id, name.trim());
                } else {
                    println!("#{} is not in '{}'.", id, name.trim());
                }
            }

            ListCommands::Delete { name, yes } => {
                let deleted = store.delete_list_confirmed(&name, |name| {
                    yes || confirm(&format!("Are you sure you want to delete \"{}\"?", name))
                })?;
                if deleted {
                    println!("Deleted list '{}'.", name.trim());
                } else if store.list(&name)?.is_some() {
                    println!("Kept list '{}'.", name.trim());
                } else {
                    println!("{}", missing_list_message(&store, &name)?);
                }
            }

            ListCommands::Show { name } => {
                let ids = require_list(&store, &name)?;
                let companies = catalog.resolve(&ids);
                println!("{} ({} companies)\n", name.trim(), ids.len());
                if companies.is_empty() {
                    println!("No companies in this list.");
                } else {
                    print_table(&companies);
                }
                let dangling = catalog.dangling(&ids);
                if !dangling.is_empty() {
                    println!("\nNot in the current catalog: {:?}", dangling);
                }
            }

            ListCommands::Export { name, output } => {
                let ids = require_list(&store, &name)?;
                let csv = export::export_list(&catalog.resolve(&ids));
                let path = output.unwrap_or_else(|| PathBuf::from(export::list_file_name(&name)));
                std::fs::write(&path, csv)
                    .with_context(|| format!("Failed to write to {}", path.display()))?;
                println!("Exported '{}' to {}", name.trim(), path.display());
            }

            ListCommands::ExportAll { output } => {
                let lists = store.lists()?;
                let csv = export::export_all_lists(&lists, &catalog);
                let path = output.unwrap_or_else(|| PathBuf::from(export::ALL_LISTS_FILE));
                std::fs::write(&path, csv)
                    .with_context(|| format!("Failed to write to {}", path.display()))?;
                println!("Exported {} list(s) to {}", lists.len(), path.display());
            }
        },

        Commands::Note { command } => match command {
            NoteCommands::Set { id, content } => {
                let company = find_company(&catalog, id)?;
                store.save_note(id, &content)?;
                println!("Saved note for {}.", company.name);
            }

            NoteCommands::Show { id } => match store.note(id)? {
                Some(note) => {
                    println!("Note for #{} ({})", id, note.timestamp.format("%Y-%m-%d %H:%M:%S"));
                    println!("\n{}", note.content);
                }
                None => println!("No note for #{}.", id),
            },

            NoteCommands::Delete { id } => {
                if store.delete_note(id)? {
                    println!("Deleted note for #{}.", id);
                } else {
                    println!("No note for #{}.", id);
                }
            }
        },

        Commands::Search { command } => match command {
            SearchCommands::List => {
                let searches = store.saved_searches()?;
                if searches.is_empty() {
                    println!("No saved searches.");
                } else {
                    println!("{:<18} {:<24} {:<30} {:<17}", "ID", "QUERY", "FILTERS", "SAVED");
                    println!("{}", "-".repeat(92));
                    for s in searches {
                        let filters = if s.filters.is_empty() {
                            "-".to_string()
                        } else {
                            s.filters.active_dimensions().join(", ")
                        };
                        let query = if s.query.is_empty() { "(all)" } else { s.query.as_str() };
                        println!(
                            "{:<18} {:<24} {:<30} {:<17}",
                            s.id,
                            truncate(query, 22),
                            truncate(&filters, 28),
                            s.saved_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }

            SearchCommands::Run { id, page } => {
                let saved = store
                    .saved_search(&id)?
                    .ok_or_else(|| anyhow!("Saved search #{} not found", id))?;
                let query = Query {
                    sort: page.sort_spec()?,
                    page: page.page,
                    page_size: page.page_size,
                    ..saved.to_query()
                };
                let result = query::run(catalog.companies(), &query)?;
                print_page(&result, &query);
            }

            SearchCommands::Delete { id } => {
                if store.delete_saved_search(&id)? {
                    println!("Deleted saved search #{}.", id);
                } else {
                    println!("Saved search #{} not found.", id);
                }
            }
        },

        Commands::Reset { namespace, yes } => {
            let ns: Namespace = namespace.parse()?;
            let location = store
                .storage()
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string());
            if !yes && !confirm(&format!("Clear all {} in {}?", ns.name(), location)) {
                println!("Nothing cleared.");
                return Ok(());
            }
            store.clear(ns)?;
            println!("Cleared {}.", ns.name());
        }
    }

    Ok(())
}

fn find_company(catalog: &Catalog, id: i64) -> Result<&Company> {
    catalog
        .get(id)
        .ok_or_else(|| anyhow!("Company #{} not found", id))
}

fn require_list<S: db::Storage>(store: &Store<S>, name: &str) -> Result<Vec<i64>> {
    match store.list(name)? {
        Some(ids) => Ok(ids),
        None => Err(anyhow!(missing_list_message(store, name)?)),
    }
}

fn missing_list_message<S: db::Storage>(store: &Store<S>, name: &str) -> Result<String> {
    let lists = store.lists()?;
    let names: Vec<&str> = lists.keys().map(String::as_str).collect();
    Ok(match suggest(name.trim(), &names) {
        Some(close) => format!("List '{}' not found. Did you mean '{}'?", name.trim(), close),
        None => format!("List '{}' not found.", name.trim()),
    })
}

/// Closest candidate by Jaro-Winkler similarity, if any is reasonably close.
fn suggest<'a>(name: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let name = name.to_lowercase();
    candidates
        .iter()
        .map(|c| (*c, strsim::jaro_winkler(&name, &c.to_lowercase())))
        .filter(|(_, score)| *score >= 0.8)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(c, _)| c)
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_page(result: &QueryPage, query: &Query) {
    let mut applied = Vec::new();
    if !query.term.trim().is_empty() {
        applied.push(format!("\"{}\"", query.term.trim()));
    }
    applied.extend(query.filters.active_dimensions());
    if !applied.is_empty() {
        println!("Filters applied: {}", applied.join(" • "));
    }

    if result.items.is_empty() {
        if result.total == 0 {
            println!("No companies found. Try adjusting your search or filters.");
        } else {
            println!(
                "Page {} is past the end ({} page(s) of results).",
                result.page, result.total_pages
            );
        }
        return;
    }

    print_table(&result.items);
    println!("\n{}", page_footer(result, query));
}

fn page_footer(result: &QueryPage, query: &Query) -> String {
    format!(
        "Showing {} of {} companies (page {} of {}, {} per page, sorted by {} {})",
        result.items.len(),
        result.total,
        result.page,
        result.total_pages,
        result.page_size,
        query.sort.key,
        query.sort.direction
    )
}

fn print_table(companies: &[&Company]) {
    println!(
        "{:<5} {:<22} {:<16} {:<22} {:>7} {:<10}",
        "ID", "NAME", "INDUSTRY", "LOCATION", "FOUNDED", "EMPLOYEES"
    );
    println!("{}", "-".repeat(87));
    for c in companies {
        println!(
            "{:<5} {:<22} {:<16} {:<22} {:>7} {:<10}",
            c.id,
            truncate(&c.name, 20),
            truncate(&c.industry, 14),
            truncate(&c.location, 20),
            c.founded,
            c.employees
        );
    }
}

fn print_company(c: &Company) {
    println!("Company #{}", c.id);
    println!("Name: {}", c.name);
    println!("Industry: {}", c.industry);
    println!("Location: {}", c.location);
    println!("Founded: {}", c.founded);
    println!("Employees: {}", c.employees);
    println!("Website: {}", c.website);
    if !c.logo.is_empty() {
        println!("Logo: {}", c.logo);
    }
    if !c.description.is_empty() {
        println!("\n{}\n", textwrap::fill(&c.description, 78));
    }
}

fn print_enrichment(cached: &CachedEnrichment) {
    let result = &cached.result;
    println!("--- Enrichment ({}) ---", cached.cached_at.format("%Y-%m-%d %H:%M"));
    println!("{}", textwrap::fill(&result.summary, 78));

    if !result.bullets.is_empty() {
        println!("\nWhat they do:");
        for bullet in &result.bullets {
            let opts = textwrap::Options::new(78)
                .initial_indent("  - ")
                .subsequent_indent("    ");
            println!("{}", textwrap::fill(bullet, opts));
        }
    }

    if !result.keywords.is_empty() {
        println!("\nKeywords: {}", result.keywords.join(", "));
    }

    if !result.signals.is_empty() {
        println!("\nSignals:");
        for signal in &result.signals {
            println!("  {} {:<12} {}", signal.icon, signal.kind, signal.description);
        }
    }

    if !result.sources.is_empty() {
        println!("\nSources:");
        for source in &result.sources {
            println!("  {} ({})", source.url, source.fetched_at);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Zürich Fintech GmbH", 10), "Zürich ...");
    }

    #[test]
    fn test_suggest_close_list_name() {
        let names = ["Fintech", "Climate", "Seed Stage"];
        assert_eq!(suggest("fintec", &names), Some("Fintech"));
        assert_eq!(suggest("zzz", &names), None);
    }

    #[test]
    fn test_page_args_reject_unknown_sort_key() {
        let page = PageArgs {
            sort: "revenue".to_string(),
            direction: "asc".to_string(),
            page: 1,
            page_size: 10,
        };
        let err = page.sort_spec().unwrap_err();
        assert!(err.to_string().contains("Unknown sort key 'revenue'"));
    }

    #[test]
    fn test_cli_parses_repeatable_filters() {
        let cli = Cli::try_parse_from([
            "scout", "companies", "robots", "-i", "Robotics", "-i", "AI/ML", "--page", "-2",
        ])
        .unwrap();
        match cli.command {
            Commands::Companies { filters, page, save } => {
                assert_eq!(page.direction.parse::<SortDirection>().unwrap(), SortDirection::Asc);
                assert_eq!(filters.term(), "robots");
                assert_eq!(filters.filter_set().industries.len(), 2);
                assert_eq!(page.page, -2);
                assert!(!save);
            }
            _ => panic!("expected companies command"),
        }
    }

    #[test]
    fn test_require_list_suggests_close_name() {
        let store = Store::new(db::MemoryStorage::new());
        store.create_list("Fintech").unwrap();
        store.save_to_list("Fintech", 2).unwrap();

        assert_eq!(require_list(&store, " Fintech ").unwrap(), vec![2]);
        let err = require_list(&store, "fintec").unwrap_err();
        assert_eq!(err.to_string(), "List 'fintec' not found. Did you mean 'Fintech'?");
        let err = require_list(&store, "Climate").unwrap_err();
        assert_eq!(err.to_string(), "List 'Climate' not found.");
    }

    #[test]
    fn test_page_footer_reports_page_size() {
        let catalog = Catalog::seed().unwrap();
        let query = Query {
            page: 2,
            page_size: 5,
            ..Default::default()
        };
        let result = query::run(catalog.companies(), &query).unwrap();
        assert_eq!(
            page_footer(&result, &query),
            "Showing 5 of 16 companies (page 2 of 4, 5 per page, sorted by name asc)"
        );
    }

    #[test]
    fn test_saved_search_run_overrides_paging_only() {
        let store = Store::new(db::MemoryStorage::new());
        let filters = FilterSet {
            industries: ["Fintech".to_string()].into(),
            ..Default::default()
        };
        let saved = store.save_search("pay", &filters).unwrap();

        let query = Query {
            page: 2,
            page_size: 1,
            ..saved.to_query()
        };
        let catalog = Catalog::seed().unwrap();
        let result = query::run(catalog.companies(), &query).unwrap();
        // Ledgerline and Paywise mention payments and are Fintech
        assert_eq!(result.total, 2);
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].name, "Paywise");
    }
}
