//! Configuration for the Scopus Search client.

use crate::error::{Result, ScopusError};
use std::time::Duration;
use url::Url;

/// API configuration constants.
pub mod api {
    use std::time::Duration;

    /// Scopus Search API endpoint.
    pub const SEARCH_URL: &str = "https://api.elsevier.com/content/search/scopus";

    /// Environment variable holding the API key.
    pub const API_KEY_ENV: &str = "SCOPUS_API_KEY";

    /// Environment variable overriding the search endpoint.
    pub const SEARCH_URL_ENV: &str = "SCOPUS_SEARCH_URL";

    /// Header carrying the API key (`X-ELS-APIKey`).
    pub const API_KEY_HEADER: &str = "x-els-apikey";

    /// Result view requested from the API.
    pub const DEFAULT_VIEW: &str = "COMPLETE";

    /// Entries per page. The COMPLETE view caps this at 25.
    pub const DEFAULT_PAGE_SIZE: u32 = 25;

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Citation refresh: maximum passes over the failed set.
    pub const MAX_RETRY_PASSES: u32 = 5;

    /// Citation refresh: fixed sleep after a failed lookup.
    pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

    /// Fields requested when only citation counts are needed.
    pub const CITATION_FIELDS: &str = "eid,citedby-count";
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Scopus API key sent as `X-ELS-APIKey`.
    pub api_key: String,

    /// Search endpoint (overridable for mock servers).
    pub search_url: String,

    /// `view` query parameter.
    pub view: String,

    /// Optional `field` query parameter limiting the returned fields.
    pub fields: Option<String>,

    /// `count` query parameter.
    pub page_size: u32,

    /// Request timeout.
    pub request_timeout: Duration,

    /// Fixed sleep between consecutive requests.
    pub request_delay: Duration,

    /// Citation refresh pass limit.
    pub max_retry_passes: u32,

    /// Citation refresh sleep after each failure.
    pub retry_backoff: Duration,
}

impl Config {
    /// Create a configuration for the production endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            search_url: api::SEARCH_URL.to_string(),
            view: api::DEFAULT_VIEW.to_string(),
            fields: None,
            page_size: api::DEFAULT_PAGE_SIZE,
            request_timeout: api::REQUEST_TIMEOUT,
            request_delay: Duration::ZERO,
            max_retry_passes: api::MAX_RETRY_PASSES,
            retry_backoff: api::RETRY_BACKOFF,
        }
    }

    /// Create a test configuration pointing at a mock server.
    #[must_use]
    pub fn for_testing(base_url: &str) -> Self {
        Self {
            api_key: "test-key".to_string(),
            search_url: format!("{}/content/search/scopus", base_url.trim_end_matches('/')),
            view: api::DEFAULT_VIEW.to_string(),
            fields: None,
            page_size: api::DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(5),
            request_delay: Duration::ZERO,
            max_retry_passes: api::MAX_RETRY_PASSES,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `Config` error if the API key is unset or empty, or if the
    /// endpoint override is not a valid URL.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(
            std::env::var(api::API_KEY_ENV).ok(),
            std::env::var(api::SEARCH_URL_ENV).ok(),
        )
    }

    fn from_vars(api_key: Option<String>, search_url: Option<String>) -> Result<Self> {
        let api_key = api_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            ScopusError::Config(format!(
                "You must set the {} environment variable.",
                api::API_KEY_ENV
            ))
        })?;

        let mut config = Self::new(api_key);
        if let Some(url) = search_url {
            config.search_url = url;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check the endpoint and paging parameters.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.search_url).map_err(|e| {
            ScopusError::Config(format!("Invalid search URL '{}': {}", self.search_url, e))
        })?;
        if self.page_size == 0 {
            return Err(ScopusError::Config("page size must be at least 1".to_string()));
        }
        if self.max_retry_passes == 0 {
            return Err(ScopusError::Config("retry passes must be at least 1".to_string()));
        }
        Ok(())
    }
}
