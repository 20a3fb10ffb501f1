//! Ripple-Collector: a resumable, polite web crawler engine
//!
//! This crate discovers references from start URLs and sitemaps, fetches them
//! through an ordered list of fetchers, hands documents to an importer and a
//! committer, and keeps the crawl state of every reference in a persistent
//! store so an interrupted crawl can resume.

pub mod config;
pub mod crawler;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod robots;
pub mod sitemap;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Ripple-Collector operations
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Import failed for {reference}: {message}")]
    Import { reference: String, message: String },

    #[error("Commit error: {0}")]
    Commit(#[from] pipeline::CommitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawler error: {0}")]
    Crawler(String),
}

impl CollectorError {
    /// Returns true if the error must stop the whole crawl
    ///
    /// Everything else is local to the reference being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Ripple-Collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::Crawler;
pub use state::{CachedReference, CrawlReference, CrawlState};
pub use url::{url_root, UrlNormalizer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_storage_errors_are_fatal() {
        let storage = CollectorError::Storage(storage::StorageError::Database("gone".into()));
        assert!(storage.is_fatal());

        let import = CollectorError::Import {
            reference: "https://example.com/".into(),
            message: "bad".into(),
        };
        assert!(!import.is_fatal());
        assert!(!CollectorError::Crawler("x".into()).is_fatal());
    }
}
