use anyhow::{bail, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Runtime settings, resolved from command-line flags and their `SCOUT_*`
/// environment fallbacks.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub companies: Option<PathBuf>,
    pub api_url: String,
    pub timeout: Duration,
    pub max_db_pages: Option<i64>,
}

impl Config {
    pub fn resolve(
        data_dir: Option<PathBuf>,
        companies: Option<PathBuf>,
        api_url: String,
        timeout_secs: u64,
        max_db_pages: Option<i64>,
    ) -> Result<Self> {
        if timeout_secs == 0 {
            bail!("Request timeout must be at least 1 second");
        }
        if api_url.trim().is_empty() {
            bail!("API URL cannot be empty. Set --api-url or SCOUT_API_URL");
        }
        if matches!(max_db_pages, Some(pages) if pages < 1) {
            bail!("Database page cap must be at least 1");
        }
        Ok(Self {
            data_dir: data_dir.unwrap_or_else(default_data_dir),
            companies,
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            max_db_pages,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("scout.db")
    }

    pub fn companies_path(&self) -> Option<&Path> {
        self.companies.as_deref()
    }
}

fn default_data_dir() -> PathBuf {
    // XDG data directory, or the working directory if none can be determined
    if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "scout") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        PathBuf::from(".")
    }
}

/// Logs go to stderr so command output stays pipeable. `SCOUT_LOG` takes an
/// `EnvFilter` directive and wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env("SCOUT_LOG").unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("scout=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_uses_explicit_data_dir() {
        let config = Config::resolve(
            Some(PathBuf::from("/tmp/scout-test")),
            None,
            "http://localhost:8000/api".to_string(),
            15,
            None,
        )
        .unwrap();
        assert_eq!(config.db_path(), PathBuf::from("/tmp/scout-test/scout.db"));
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert!(config.companies_path().is_none());
    }

    #[test]
    fn test_resolve_rejects_zero_timeout() {
        let err = Config::resolve(None, None, "http://x".to_string(), 0, None).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_resolve_rejects_blank_api_url() {
        assert!(Config::resolve(None, None, "  ".to_string(), 10, None).is_err());
    }

    #[test]
    fn test_resolve_rejects_nonpositive_page_cap() {
        assert!(Config::resolve(None, None, "http://x".to_string(), 10, Some(0)).is_err());
        let config = Config::resolve(None, None, "http://x".to_string(), 10, Some(64)).unwrap();
        assert_eq!(config.max_db_pages, Some(64));
    }
}
