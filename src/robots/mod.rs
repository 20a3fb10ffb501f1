//! Robots.txt handling module
//!
//! This module provides the robots policy consulted by the queue pipeline,
//! the sitemap resolver and the politeness delay. The default policy fetches
//! robots.txt once per URL root and caches it.

mod cache;
mod parser;

pub use cache::{RobotsCache, RobotsOrigin};
pub use parser::ParsedRobots;

use crate::url::root_of;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Decides which URLs may be fetched and exposes robots.txt hints
#[async_trait]
pub trait RobotsPolicy: Send + Sync {
    /// Returns true if the URL may be crawled
    async fn is_allowed(&self, url: &Url) -> bool;

    /// Returns true if robots rules are switched off
    fn is_ignored(&self) -> bool {
        false
    }

    /// Sitemap locations advertised by the robots.txt of a URL root
    async fn sitemaps(&self, _url_root: &str) -> Vec<String> {
        Vec::new()
    }

    /// Crawl delay requested by the robots.txt of a URL root
    async fn crawl_delay(&self, _url_root: &str) -> Option<Duration> {
        None
    }
}

/// Robots policy backed by each site's `/robots.txt`
pub struct RobotsTxtPolicy {
    client: Client,
    /// Product token matched against User-agent lines
    agent_token: String,
    ignored: bool,
    cache: RobotsCache,
}

impl RobotsTxtPolicy {
    /// Creates a new policy
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client used to download robots.txt files
    /// * `agent_token` - The crawler name matched against User-agent groups
    /// * `ignored` - When true every URL is allowed, but Sitemap lines are still read
    pub fn new(client: Client, agent_token: impl Into<String>, ignored: bool) -> Self {
        Self {
            client,
            agent_token: agent_token.into(),
            ignored,
            cache: RobotsCache::new(),
        }
    }

    /// Gets robots.txt for a URL root, fetching it if absent or stale
    pub async fn robots_for(&self, url_root: &str) -> ParsedRobots {
        if let Some(rules) = self.cache.lookup(url_root).await {
            return rules;
        }

        let (rules, origin) = self.fetch_robots(url_root).await;
        self.cache.store(url_root, rules.clone(), origin).await;
        rules
    }

    /// Downloads and parses robots.txt
    ///
    /// Missing files and failed downloads allow everything.
    async fn fetch_robots(&self, url_root: &str) -> (ParsedRobots, RobotsOrigin) {
        let location = format!("{}/robots.txt", url_root);
        tracing::debug!("Fetching {}", location);

        let response = match self.client.get(&location).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Could not fetch {}: {}", location, e);
                return (ParsedRobots::allow_all(), RobotsOrigin::Unreachable);
            }
        };

        if !response.status().is_success() {
            tracing::debug!("No robots.txt at {} ({})", location, response.status());
            return (ParsedRobots::allow_all(), RobotsOrigin::Absent);
        }

        match response.text().await {
            Ok(body) => (ParsedRobots::from_content(&body), RobotsOrigin::Downloaded),
            Err(e) => {
                tracing::warn!("Could not read {}: {}", location, e);
                (ParsedRobots::allow_all(), RobotsOrigin::Unreachable)
            }
        }
    }
}

#[async_trait]
impl RobotsPolicy for RobotsTxtPolicy {
    async fn is_allowed(&self, url: &Url) -> bool {
        if self.ignored {
            return true;
        }
        let Some(root) = root_of(url) else {
            return true;
        };
        self.robots_for(&root)
            .await
            .is_allowed(url.as_str(), &self.agent_token)
    }

    fn is_ignored(&self) -> bool {
        self.ignored
    }

    async fn sitemaps(&self, url_root: &str) -> Vec<String> {
        self.robots_for(url_root).await.sitemaps()
    }

    async fn crawl_delay(&self, url_root: &str) -> Option<Duration> {
        if self.ignored {
            return None;
        }
        self.robots_for(url_root)
            .await
            .crawl_delay(&self.agent_token)
            .map(Duration::from_secs_f64)
    }
}
