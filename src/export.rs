use crate::catalog::Catalog;
use crate::models::Company;
use crate::store::Lists;

pub const LIST_HEADER: &str = "Name,Industry,Location,Founded,Employees,Website";
pub const ALL_LISTS_HEADER: &str =
    "List Name,Company Name,Industry,Location,Founded,Employees,Website";
pub const ALL_LISTS_FILE: &str = "all-lists-export.csv";

/// Double-quoted field with embedded quotes doubled.
fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn company_fields(c: &Company) -> [String; 6] {
    [
        quote(&c.name),
        quote(&c.industry),
        quote(&c.location),
        c.founded.to_string(),
        quote(&c.employees),
        quote(&c.website),
    ]
}

pub fn export_list(companies: &[&Company]) -> String {
    let mut rows = vec![LIST_HEADER.to_string()];
    rows.extend(companies.iter().map(|c| company_fields(c).join(",")));
    rows.join("\n")
}

/// One row per (list, company) pair. Ids missing from the catalog are skipped.
pub fn export_all_lists(lists: &Lists, catalog: &Catalog) -> String {
    let mut rows = vec![ALL_LISTS_HEADER.to_string()];
    for (name, ids) in lists {
        for company in catalog.resolve(ids) {
            let mut fields = vec![quote(name)];
            fields.extend(company_fields(company));
            rows.push(fields.join(","));
        }
    }
    rows.join("\n")
}

/// `<list>-companies.csv`, with path separators replaced.
pub fn list_file_name(list: &str) -> String {
    let safe: String = list
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
        .collect();
    format!("{}-companies.csv", safe)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(id: i64, name: &str) -> Company {
        Company {
            id,
            name: name.to_string(),
            industry: "Fintech".to_string(),
            location: "London, UK".to_string(),
            founded: 2018,
            employees: "11-50".to_string(),
            website: "https://example.com".to_string(),
            logo: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn test_export_list() {
        let a = company(1, "Ledger");
        let csv = export_list(&[&a]);
        assert_eq!(
            csv,
            "Name,Industry,Location,Founded,Employees,Website\n\
             \"Ledger\",\"Fintech\",\"London, UK\",2018,\"11-50\",\"https://example.com\""
        );
    }

    #[test]
    fn test_export_escapes_embedded_quotes() {
        let a = company(1, r#"The "Best" Bank"#);
        let csv = export_list(&[&a]);
        let row = csv.lines().nth(1).unwrap();
        assert!(row.starts_with(r#""The ""Best"" Bank","#));
    }

    #[test]
    fn test_export_empty_list_is_header_only() {
        assert_eq!(export_list(&[]), LIST_HEADER);
    }

    #[test]
    fn test_export_all_lists_skips_dangling_ids() {
        let catalog = Catalog::new(vec![company(1, "Ledger"), company(2, "Vault")]).unwrap();
        let mut lists = Lists::new();
        lists.insert("Seed".to_string(), vec![2, 77]);
        lists.insert("Watch".to_string(), vec![1, 2]);

        let csv = export_all_lists(&lists, &catalog);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], ALL_LISTS_HEADER);
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with(r#""Seed","Vault","#));
        assert!(lines[2].starts_with(r#""Watch","Ledger","#));
        assert!(lines[3].starts_with(r#""Watch","Vault","#));
    }

    #[test]
    fn test_list_file_name() {
        assert_eq!(list_file_name("Fintech"), "Fintech-companies.csv");
        assert_eq!(list_file_name("AI/ML"), "AI-ML-companies.csv");
    }
}
