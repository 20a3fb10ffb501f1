use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for the collector
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub start: StartConfig,
    #[serde(rename = "url-normalizer", default)]
    pub url_normalizer: NormalizerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub committer: CommitterConfig,
    #[serde(default)]
    pub exclude: Vec<DomainEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of worker tasks processing references in parallel
    #[serde(rename = "num-threads", default = "default_num_threads")]
    pub num_threads: u32,

    /// Maximum depth to crawl from seed URLs (unlimited when absent)
    #[serde(rename = "max-depth", default)]
    pub max_depth: Option<u32>,

    /// What to do with references of the previous run not seen in this one
    #[serde(rename = "orphans-strategy", default)]
    pub orphans_strategy: OrphansStrategy,

    #[serde(rename = "ignore-robots-txt", default)]
    pub ignore_robots_txt: bool,

    #[serde(rename = "ignore-robots-meta", default)]
    pub ignore_robots_meta: bool,

    #[serde(rename = "ignore-sitemap", default)]
    pub ignore_sitemap: bool,

    #[serde(rename = "ignore-canonical-links", default)]
    pub ignore_canonical_links: bool,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_delay_ms")]
    pub min_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            num_threads: default_num_threads(),
            max_depth: None,
            orphans_strategy: OrphansStrategy::default(),
            ignore_robots_txt: false,
            ignore_robots_meta: false,
            ignore_sitemap: false,
            ignore_canonical_links: false,
            min_delay_ms: default_min_delay_ms(),
        }
    }
}

/// Handling of references cached from the previous run but not reached again
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphansStrategy {
    /// Leave them alone
    #[default]
    Ignore,
    /// Queue them for processing
    Process,
    /// Remove them from the committer
    Delete,
}

/// Fetch client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Retries per fetcher after a retryable failure
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay between retries (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Timeout for a single fetch attempt (milliseconds)
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// HTTP statuses treated as transient
    #[serde(rename = "retryable-statuses", default = "default_retryable_statuses")]
    pub retryable_statuses: Vec<u16>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_ms: default_timeout_ms(),
            retryable_statuses: default_retryable_statuses(),
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the user agent header value
    ///
    /// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "RippleCollector".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/bot".to_string(),
            contact_email: "bot@example.com".to_string(),
        }
    }
}

/// Start URL sources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartConfig {
    /// Explicit start URLs
    #[serde(default)]
    pub urls: Vec<String>,

    /// Files listing one start URL per line
    #[serde(rename = "url-files", default)]
    pub url_files: Vec<PathBuf>,

    /// Sitemaps whose entries are start URLs
    #[serde(default)]
    pub sitemaps: Vec<String>,
}

impl StartConfig {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.url_files.is_empty() && self.sitemaps.is_empty()
    }
}

/// URL normalization rules applied before deduplication
#[derive(Debug, Clone, Deserialize)]
pub struct NormalizerConfig {
    #[serde(rename = "remove-www", default)]
    pub remove_www: bool,

    #[serde(rename = "remove-trailing-slash", default)]
    pub remove_trailing_slash: bool,

    #[serde(rename = "remove-tracking-params", default = "default_true")]
    pub remove_tracking_params: bool,

    #[serde(rename = "sort-query-params", default = "default_true")]
    pub sort_query_params: bool,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            remove_www: false,
            remove_trailing_slash: false,
            remove_tracking_params: true,
            sort_query_params: true,
        }
    }
}

/// Crawl store location
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite crawl store
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "./crawl.db".to_string(),
        }
    }
}

/// Committer output location
#[derive(Debug, Clone, Deserialize)]
pub struct CommitterConfig {
    /// Path to the SQLite database receiving committed documents
    pub path: String,
}

impl Default for CommitterConfig {
    fn default() -> Self {
        Self {
            path: "./documents.db".to_string(),
        }
    }
}

/// Simple domain entry for exclusion lists
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
    /// Domain pattern (e.g., "example.com" or "*.example.com")
    pub domain: String,
}

fn default_num_threads() -> u32 {
    4
}

fn default_min_delay_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retryable_statuses() -> Vec<u16> {
    vec![408, 429, 500, 502, 503, 504]
}

fn default_true() -> bool {
    true
}
