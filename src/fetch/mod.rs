//! HTTP fetching module
//!
//! This module handles everything between a reference and its bytes:
//! - The `HttpFetcher` seam and the default reqwest-based fetcher
//! - The fetch client trying fetchers in order with retries
//! - Politeness delays between requests to the same host

mod client;
mod delay;
mod generic;
mod response;

pub use client::{FetchClientConfig, HttpFetchClient};
pub use delay::DelayResolver;
pub use generic::{build_http_client, GenericHttpFetcher};
pub use response::{HttpFetchClientResponse, HttpFetchResponse};

use crate::state::CrawlReference;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// HTTP method requested from a fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Head,
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
        }
    }
}

/// Errors raised by a single fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("No fetcher configured")]
    NoFetcher,
}

/// A pluggable HTTP fetcher
///
/// Fetchers classify their own responses into a crawl state. The fetch client
/// decides whether to retry, fall back to the next fetcher, or stop.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// Identifier used in logs and recorded with each attempt
    fn id(&self) -> &str;

    /// Returns true if this fetcher handles the reference with the given method
    fn accepts(&self, _reference: &CrawlReference, _method: HttpMethod) -> bool {
        true
    }

    /// Waits until the fetcher may contact the reference's host
    ///
    /// Called before every attempt, outside of the attempt timeout.
    async fn await_turn(&self, _reference: &CrawlReference) {}

    /// Performs one request
    async fn fetch(
        &self,
        reference: &CrawlReference,
        method: HttpMethod,
    ) -> Result<HttpFetchResponse, FetchError>;
}
