use crate::config::FetchConfig;
use crate::fetch::{FetchError, HttpFetchClientResponse, HttpFetchResponse, HttpFetcher, HttpMethod};
use crate::state::{CrawlReference, CrawlState};
use crate::{CollectorError, ConfigError};
use std::sync::Arc;
use std::time::Duration;

/// Retry and timeout settings of the fetch client
#[derive(Debug, Clone)]
pub struct FetchClientConfig {
    /// Retries per fetcher after a retryable failure
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Timeout of a single attempt
    pub timeout: Duration,
    /// HTTP statuses treated as transient
    pub retryable_statuses: Vec<u16>,
}

impl Default for FetchClientConfig {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

impl From<&FetchConfig> for FetchClientConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            retryable_statuses: config.retryable_statuses.clone(),
        }
    }
}

/// What the client does after an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    /// Stop and return the response
    Definitive,
    /// Retry the same fetcher, then fall through
    Retryable,
    /// Move to the next fetcher
    FallThrough,
}

/// Fetches references through an ordered list of fetchers
///
/// Fetchers are tried in order. A definitive outcome (a good state, a
/// redirect, not found, deleted or rejected) is returned right away. Transient
/// failures are retried on the same fetcher before falling through to the next
/// one. The returned response keeps every attempt, most recent first.
pub struct HttpFetchClient {
    fetchers: Vec<Arc<dyn HttpFetcher>>,
    config: FetchClientConfig,
}

impl HttpFetchClient {
    /// Creates a new fetch client
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetchClient)` - Client ready to fetch
    /// * `Err(CollectorError::Config)` - No fetcher was given
    pub fn new(
        fetchers: Vec<Arc<dyn HttpFetcher>>,
        config: FetchClientConfig,
    ) -> Result<Self, CollectorError> {
        if fetchers.is_empty() {
            return Err(ConfigError::Validation(FetchError::NoFetcher.to_string()).into());
        }
        Ok(Self { fetchers, config })
    }

    pub fn config(&self) -> &FetchClientConfig {
        &self.config
    }

    /// Fetches a reference
    ///
    /// Never fails: transport errors and timeouts are recorded as attempts
    /// in the Error state. If no fetcher accepts the reference, the response
    /// holds a single Unsupported attempt.
    pub async fn fetch(
        &self,
        reference: &CrawlReference,
        method: HttpMethod,
    ) -> HttpFetchClientResponse {
        let mut response = HttpFetchClientResponse::new();
        let mut accepted = false;

        for fetcher in &self.fetchers {
            if !fetcher.accepts(reference, method) {
                continue;
            }
            accepted = true;

            let mut attempt: u32 = 0;
            loop {
                attempt += 1;
                let result = self.attempt(fetcher.as_ref(), reference, method).await;
                let verdict = self.classify(&result);

                tracing::debug!(
                    "{} {} via {} (attempt {}): {} {}",
                    method,
                    reference.reference,
                    fetcher.id(),
                    attempt,
                    result.status_code,
                    result.crawl_state
                );
                response.record(result, fetcher.id());

                match verdict {
                    Verdict::Definitive => return response,
                    Verdict::Retryable if attempt <= self.config.max_retries => {
                        if !self.config.retry_delay.is_zero() {
                            tokio::time::sleep(self.config.retry_delay).await;
                        }
                    }
                    _ => break,
                }
            }
        }

        if !accepted {
            tracing::debug!("No fetcher accepts {} {}", method, reference.reference);
            response.record(
                HttpFetchResponse::unsupported(format!(
                    "No fetcher accepts {} {}",
                    method, reference.reference
                )),
                "none",
            );
        }

        response
    }

    async fn attempt(
        &self,
        fetcher: &dyn HttpFetcher,
        reference: &CrawlReference,
        method: HttpMethod,
    ) -> HttpFetchResponse {
        // Politeness queuing is not network time
        fetcher.await_turn(reference).await;
        match tokio::time::timeout(self.config.timeout, fetcher.fetch(reference, method)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => HttpFetchResponse::error(e.to_string()),
            Err(_) => {
                HttpFetchResponse::error(FetchError::Timeout(self.config.timeout).to_string())
            }
        }
    }

    fn classify(&self, response: &HttpFetchResponse) -> Verdict {
        match response.crawl_state {
            state if state.is_good() => Verdict::Definitive,
            CrawlState::Redirect
            | CrawlState::NotFound
            | CrawlState::Deleted
            | CrawlState::Rejected => Verdict::Definitive,
            CrawlState::Error => Verdict::Retryable,
            CrawlState::BadStatus
                if self.config.retryable_statuses.contains(&response.status_code) =>
            {
                Verdict::Retryable
            }
            _ => Verdict::FallThrough,
        }
    }
}
