//! Scopus Search API client.
//!
//! Provides the paginated search loop and the per-EID citation count lookup
//! used by the refresh pipeline. Requests are issued one at a time.

use crate::config::{api, Config};
use crate::de::{null_as_default, opt_count};
use crate::error::{Result, ScopusError};
use crate::record::Entry;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters of an error body kept in error messages
const BODY_EXCERPT_LEN: usize = 300;

/// One decoded result page.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub entries: Vec<Entry>,
    /// `opensearch:startIndex`
    pub start: Option<u64>,
    /// `opensearch:totalResults`
    pub total: Option<u64>,
    /// `opensearch:itemsPerPage`
    pub per_page: Option<u64>,
}

/// All entries gathered for one query.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub entries: Vec<Entry>,
    pub pages: usize,
    pub total: u64,
}

/// Result of a citation count refresh.
#[derive(Debug, Clone, Default)]
pub struct CitationFetch {
    /// EID -> current cited-by count
    pub counts: HashMap<String, u64>,
    /// EIDs that answered but returned no entry
    pub not_found: Vec<String>,
    /// EIDs still failing when the passes ran out
    pub missed: Vec<String>,
    /// Passes actually run
    pub passes: u32,
}

// === Scopus API Response Types ===

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "search-results", default)]
    search_results: Option<SearchResults>,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(rename = "opensearch:totalResults", default, deserialize_with = "opt_count")]
    total_results: Option<u64>,
    #[serde(rename = "opensearch:startIndex", default, deserialize_with = "opt_count")]
    start_index: Option<u64>,
    #[serde(rename = "opensearch:itemsPerPage", default, deserialize_with = "opt_count")]
    items_per_page: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    entry: Vec<Entry>,
}

/// Scopus Search API client
pub struct ScopusClient {
    client: Client,
    config: Config,
}

impl ScopusClient {
    /// Create a new client; the API key is sent on every request.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| ScopusError::Config(format!("Invalid API key header: {}", e)))?;
        headers.insert(HeaderName::from_static(api::API_KEY_HEADER), key);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ScopusError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetch one page of `query` starting at offset `start`.
    pub async fn fetch_page(&self, query: &str, start: u64) -> Result<SearchPage> {
        let mut params = vec![
            ("query", query.to_string()),
            ("view", self.config.view.clone()),
            ("count", self.config.page_size.to_string()),
            ("start", start.to_string()),
        ];
        if let Some(fields) = &self.config.fields {
            params.push(("field", fields.clone()));
        }
        let results = self.get(&params).await?;

        Ok(SearchPage {
            entries: results.entry,
            start: results.start_index,
            total: results.total_results,
            per_page: results.items_per_page,
        })
    }

    /// Run `query` to exhaustion, following `start` offsets page by page.
    ///
    /// Stops once `start + per_page >= total`. Any failed page aborts the
    /// whole query.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        info!(query = query, "Starting Scopus query");

        let mut outcome = SearchOutcome::default();
        let mut start = 0u64;

        loop {
            if outcome.pages > 0 {
                self.pause().await;
            }

            let page = self.fetch_page(query, start).await?;
            outcome.pages += 1;

            let returned = page.entries.len() as u64;
            let page_start = page.start.unwrap_or(start);
            let total = page.total.unwrap_or(0);
            let per_page = page.per_page.unwrap_or(returned);
            outcome.total = total;
            outcome
                .entries
                .extend(page.entries.into_iter().filter(|e| !e.is_placeholder()));

            debug!(
                start = page_start,
                total = total,
                per_page = per_page,
                returned = returned,
                "Fetched page"
            );

            if per_page == 0 || page_start + per_page >= total {
                break;
            }

            let next = page_start + per_page;
            if next <= start && outcome.pages > 1 {
                warn!(start = start, next = next, "Start index did not advance, stopping");
                break;
            }
            start = next;
        }

        info!(
            query = query,
            pages = outcome.pages,
            entries = outcome.entries.len(),
            total = outcome.total,
            "Scopus query complete"
        );
        Ok(outcome)
    }

    /// Look up the current cited-by count for a single EID.
    ///
    /// Returns `Ok(None)` when the API answers but has no matching entry.
    pub async fn fetch_citation_count(&self, eid: &str) -> Result<Option<u64>> {
        let params = [
            ("query", format!("EID({})", eid)),
            ("field", api::CITATION_FIELDS.to_string()),
        ];
        let results = self.get(&params).await?;

        let entries: Vec<&Entry> = results.entry.iter().filter(|e| !e.is_placeholder()).collect();
        let entry = entries
            .iter()
            .find(|e| e.eid.as_deref() == Some(eid))
            .or_else(|| entries.first());

        Ok(entry.map(|e| e.cited_by_count.unwrap_or(0)))
    }

    /// Refresh citation counts for `eids` with bounded retry.
    ///
    /// Each pass re-queries the EIDs that failed in the previous pass,
    /// sleeping `retry_backoff` after every failure, until nothing fails or
    /// `max_retry_passes` passes have run.
    pub async fn fetch_citation_counts(&self, eids: &[String]) -> CitationFetch {
        let mut fetch = CitationFetch::default();

        let mut seen = HashSet::new();
        let mut pending: Vec<String> = eids
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty() && seen.insert(e.clone()))
            .collect();
        let mut given_up = Vec::new();

        info!(total = pending.len(), "Starting citation count refresh");

        while !pending.is_empty() && fetch.passes < self.config.max_retry_passes {
            fetch.passes += 1;
            info!(pass = fetch.passes, pending = pending.len(), "Citation pass");

            let mut failed = Vec::new();
            for (idx, eid) in pending.iter().enumerate() {
                if idx > 0 {
                    self.pause().await;
                }

                match self.fetch_citation_count(eid).await {
                    Ok(Some(count)) => {
                        fetch.counts.insert(eid.clone(), count);
                    }
                    Ok(None) => {
                        debug!(eid = %eid, "No entry for EID");
                        fetch.not_found.push(eid.clone());
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(eid = %eid, pass = fetch.passes, error = %e, "Lookup failed");
                        failed.push(eid.clone());
                        tokio::time::sleep(self.config.retry_backoff).await;
                    }
                    Err(e) => {
                        warn!(eid = %eid, error = %e, "Lookup failed, not retrying");
                        given_up.push(eid.clone());
                    }
                }
            }
            pending = failed;
        }

        given_up.extend(pending);
        fetch.missed = given_up;

        info!(
            updated = fetch.counts.len(),
            not_found = fetch.not_found.len(),
            missed = fetch.missed.len(),
            passes = fetch.passes,
            "Citation count refresh complete"
        );
        fetch
    }

    async fn get(&self, params: &[(&str, String)]) -> Result<SearchResults> {
        let response = self
            .client
            .get(&self.config.search_url)
            .query(params)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Scopus API error");
            return Err(ScopusError::Api {
                code: status.as_u16(),
                message: format!(
                    "{} {}",
                    status.canonical_reason().unwrap_or("Unknown"),
                    excerpt(&body)
                )
                .trim()
                .to_string(),
            });
        }

        let data: SearchResponse = serde_json::from_str(&body).map_err(|e| {
            ScopusError::Parse(format!("Failed to parse Scopus response: {}", e))
        })?;

        data.search_results
            .ok_or_else(|| ScopusError::MissingResults(excerpt(&body)))
    }

    async fn pause(&self) {
        if self.config.request_delay > Duration::ZERO {
            tokio::time::sleep(self.config.request_delay).await;
        }
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}
