use crate::state::CrawlState;

/// Outcome of a single fetch attempt
#[derive(Debug, Clone)]
pub struct HttpFetchResponse {
    /// HTTP status code, 0 when no response was received
    pub status_code: u16,
    pub reason_phrase: Option<String>,
    pub user_agent: Option<String>,
    /// State derived by the fetcher from the response
    pub crawl_state: CrawlState,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    /// Absolute target of a redirect response
    pub redirect_target: Option<String>,
    /// URL the response was served from
    pub final_url: Option<String>,
}

impl HttpFetchResponse {
    pub fn new(crawl_state: CrawlState, status_code: u16) -> Self {
        Self {
            status_code,
            reason_phrase: None,
            user_agent: None,
            crawl_state,
            body: Vec::new(),
            content_type: None,
            redirect_target: None,
            final_url: None,
        }
    }

    /// Attempt that failed without an HTTP response
    pub fn error(reason: impl Into<String>) -> Self {
        Self::new(CrawlState::Error, 0).with_reason(reason)
    }

    /// Placeholder recorded when no fetcher accepted the reference
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::new(CrawlState::Unsupported, 0).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason_phrase = Some(reason.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_redirect_target(mut self, target: impl Into<String>) -> Self {
        self.redirect_target = Some(target.into());
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Every attempt made for one reference, most recent first
///
/// Accessors report the most recent attempt.
#[derive(Debug, Clone, Default)]
pub struct HttpFetchClientResponse {
    attempts: Vec<(HttpFetchResponse, String)>,
}

impl HttpFetchClientResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an attempt as the most recent one
    pub fn record(&mut self, response: HttpFetchResponse, fetcher_id: impl Into<String>) {
        self.attempts.insert(0, (response, fetcher_id.into()));
    }

    pub fn latest(&self) -> Option<&HttpFetchResponse> {
        self.attempts.first().map(|(response, _)| response)
    }

    /// Status code of the latest attempt, 0 if none
    pub fn status_code(&self) -> u16 {
        self.latest().map(|r| r.status_code).unwrap_or(0)
    }

    pub fn reason_phrase(&self) -> Option<&str> {
        self.latest().and_then(|r| r.reason_phrase.as_deref())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.latest().and_then(|r| r.user_agent.as_deref())
    }

    /// State of the latest attempt, None if nothing was attempted
    pub fn crawl_state(&self) -> Option<CrawlState> {
        self.latest().map(|r| r.crawl_state)
    }

    pub fn latest_fetcher(&self) -> Option<&str> {
        self.attempts.first().map(|(_, id)| id.as_str())
    }

    pub fn attempts(&self) -> &[(HttpFetchResponse, String)] {
        &self.attempts
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn into_latest(self) -> Option<HttpFetchResponse> {
        self.attempts.into_iter().next().map(|(response, _)| response)
    }
}
