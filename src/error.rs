//! Custom error types for scopus-harvest.
//!
//! All library functions return `Result<T, ScopusError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for scopus-harvest operations.
#[derive(Debug, Error)]
pub enum ScopusError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Scopus API returned a non-success status
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Status reason or response body excerpt
        message: String,
    },

    /// Response body had no `search-results` object
    #[error("Response missing search-results: {0}")]
    MissingResults(String),

    /// Malformed payload or field
    #[error("Parse error: {0}")]
    Parse(String),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ScopusError {
    /// Whether the citation refresh loop should try this request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScopusError::Network(_)
            | ScopusError::Api { .. }
            | ScopusError::MissingResults(_)
            | ScopusError::Parse(_) => true,
            _ => false,
        }
    }
}

/// Result type alias using `ScopusError`
pub type Result<T> = std::result::Result<T, ScopusError>;
