use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Storage;
use crate::models::{CachedEnrichment, Company, EnrichmentResult};
use crate::store::{Store, StoreError};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Every way one enrichment attempt can fail. Nothing is retried; the user
/// re-runs the command.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Request timed out. Please try again.")]
    Timeout,

    #[error("Server Error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("No response from server. Connection refused or unreachable.")]
    Network(String),

    #[error("Failed to make request: {0}")]
    Setup(String),
}

impl EnrichError {
    pub fn kind(&self) -> &'static str {
        match self {
            EnrichError::Timeout => "timeout",
            EnrichError::Server { .. } => "server",
            EnrichError::Network(_) => "network",
            EnrichError::Setup(_) => "setup",
        }
    }

    /// Transport detail behind the user-facing message, if any.
    pub fn detail(&self) -> Option<&str> {
        match self {
            EnrichError::Network(detail) | EnrichError::Setup(detail) => Some(detail),
            EnrichError::Timeout | EnrichError::Server { .. } => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct EnrichRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Prefixes `https://` unless the value already carries an http(s) scheme.
pub fn normalize_url(website: &str) -> Result<String, EnrichError> {
    let website = website.trim();
    if website.is_empty() {
        return Err(EnrichError::Setup("company has no website".to_string()));
    }
    if website.starts_with("http://") || website.starts_with("https://") {
        Ok(website.to_string())
    } else {
        Ok(format!("https://{}", website))
    }
}

fn endpoint_url(base_url: &str) -> Result<reqwest::Url, EnrichError> {
    let joined = format!("{}/enrich/", base_url.trim().trim_end_matches('/'));
    let url = reqwest::Url::parse(&joined)
        .map_err(|e| EnrichError::Setup(format!("invalid API URL '{}': {}", base_url, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EnrichError::Setup(format!("unsupported API URL scheme '{}'", other))),
    }
}

fn classify_transport(err: reqwest::Error) -> EnrichError {
    if err.is_timeout() {
        EnrichError::Timeout
    } else if err.is_builder() {
        EnrichError::Setup(err.to_string())
    } else {
        EnrichError::Network(err.to_string())
    }
}

fn server_error(status: u16, body: &str) -> EnrichError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| "Unknown error".to_string());
    EnrichError::Server { status, message }
}

#[derive(Debug, Clone)]
pub struct Enricher {
    client: reqwest::Client,
    endpoint: reqwest::Url,
}

impl Enricher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EnrichError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichError::Setup(e.to_string()))?;
        Self::with_client(base_url, client)
    }

    /// Uses a preconfigured client. The client's own timeout is what bounds
    /// each request.
    pub fn with_client(base_url: &str, client: reqwest::Client) -> Result<Self, EnrichError> {
        let endpoint = endpoint_url(base_url)?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }

    pub async fn enrich(&self, website: &str) -> Result<EnrichmentResult, EnrichError> {
        let url = normalize_url(website)?;
        info!(%url, endpoint = %self.endpoint, "requesting enrichment");

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EnrichRequest { url: &url })
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = server_error(status, &body);
            warn!(status, error = %err, "enrichment rejected");
            return Err(err);
        }

        let body = response.bytes().await.map_err(classify_transport)?;
        serde_json::from_slice(&body).map_err(|e| EnrichError::Server {
            status,
            message: format!("Invalid response body: {}", e),
        })
    }
}

#[derive(Debug, Error)]
pub enum EnrichCompanyError {
    #[error(transparent)]
    Enrich(#[from] EnrichError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug)]
pub enum EnrichOutcome {
    /// Fetched now and written to the cache.
    Fresh(CachedEnrichment),
    /// Served from the cache without a request.
    Cached(CachedEnrichment),
    /// Abandoned before the response arrived; the cache was not touched.
    Cancelled,
}

/// Enriches `company`, using the cached result unless `force` is set.
/// If `cancel` resolves first the request is dropped and nothing is stored.
pub async fn enrich_company<S, C>(
    enricher: &Enricher,
    store: &Store<S>,
    company: &Company,
    force: bool,
    cancel: C,
) -> Result<EnrichOutcome, EnrichCompanyError>
where
    S: Storage,
    C: Future<Output = ()>,
{
    if !force {
        if let Some(cached) = store.cached_enrichment(company.id)? {
            return Ok(EnrichOutcome::Cached(cached));
        }
    }

    let result = tokio::select! {
        biased;
        _ = cancel => {
            info!(company_id = company.id, "enrichment cancelled");
            return Ok(EnrichOutcome::Cancelled);
        }
        result = enricher.enrich(&company.website) => result.inspect_err(|e| {
            warn!(
                company_id = company.id,
                kind = e.kind(),
                detail = e.detail().unwrap_or("-"),
                error = %e,
                "enrichment failed"
            );
        })?,
    };

    let cached = store.cache_enrichment(company.id, result)?;
    Ok(EnrichOutcome::Fresh(cached))
}
