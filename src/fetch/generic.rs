//! Default fetcher built on reqwest

use crate::config::UserAgentConfig;
use crate::fetch::{DelayResolver, FetchError, HttpFetchResponse, HttpFetcher, HttpMethod};
use crate::state::{CrawlReference, CrawlState};
use async_trait::async_trait;
use reqwest::{header, redirect::Policy, Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// Redirects are not followed: a redirect is reported as its own crawl state
/// and the target goes back through the queue.
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Timeout of a whole request
///
/// # Example
///
/// ```no_run
/// use ripple_collector::config::UserAgentConfig;
/// use ripple_collector::fetch::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Plain HTTP fetcher
pub struct GenericHttpFetcher {
    id: String,
    client: Client,
    user_agent: String,
    delay: Option<Arc<DelayResolver>>,
}

impl GenericHttpFetcher {
    pub fn new(client: Client, user_agent: impl Into<String>) -> Self {
        Self {
            id: "generic".to_string(),
            client,
            user_agent: user_agent.into(),
            delay: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Spaces out requests to the same host; the wait is not part of a fetch
    pub fn with_delay(mut self, delay: Arc<DelayResolver>) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Maps an HTTP status to a crawl state
///
/// 2xx is reported as New; the crawler refines it against the cached checksum.
fn state_for_status(status: StatusCode) -> CrawlState {
    match status.as_u16() {
        200..=299 => CrawlState::New,
        304 => CrawlState::Unmodified,
        301 | 302 | 303 | 307 | 308 => CrawlState::Redirect,
        404 | 410 => CrawlState::NotFound,
        _ => CrawlState::BadStatus,
    }
}

#[async_trait]
impl HttpFetcher for GenericHttpFetcher {
    fn id(&self) -> &str {
        &self.id
    }

    async fn await_turn(&self, reference: &CrawlReference) {
        let Some(delay) = &self.delay else {
            return;
        };
        if let Ok(url) = Url::parse(&reference.reference) {
            delay.wait(&url).await;
        }
    }

    async fn fetch(
        &self,
        reference: &CrawlReference,
        method: HttpMethod,
    ) -> Result<HttpFetchResponse, FetchError> {
        let url = Url::parse(&reference.reference)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", reference.reference, e)))?;

        let request = match method {
            HttpMethod::Get => self.client.get(url.clone()),
            HttpMethod::Head => self.client.head(url.clone()),
        };
        let response = request.send().await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut state = state_for_status(status);
        let mut result = HttpFetchResponse::new(state, status.as_u16())
            .with_reason(status.canonical_reason().unwrap_or("Unknown"))
            .with_user_agent(self.user_agent.clone());
        result.final_url = Some(final_url);
        result.content_type = content_type;

        if state == CrawlState::Redirect {
            match location.and_then(|l| url.join(&l).ok()) {
                Some(target) => result = result.with_redirect_target(target.to_string()),
                None => {
                    tracing::debug!("{} redirects without a usable Location", url);
                    state = CrawlState::BadStatus;
                    result.crawl_state = state;
                }
            }
        }

        if state.is_good() && method == HttpMethod::Get {
            let body = response.bytes().await?;
            result = result.with_body(body.to_vec());
        }

        Ok(result)
    }
}
