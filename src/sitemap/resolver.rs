use crate::fetch::{HttpFetchClient, HttpMethod};
use crate::robots::RobotsPolicy;
use crate::sitemap::{SitemapItem, SitemapParser, SitemapSink};
use crate::state::CrawlReference;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Finds and reads the sitemaps of a URL root
#[async_trait]
pub trait SitemapResolver: Send + Sync {
    /// Resolves the sitemaps of a URL root and streams their pages to `sink`
    ///
    /// # Arguments
    ///
    /// * `client` - Fetch client used to download sitemaps
    /// * `url_root` - Scheme, host and port the sitemaps belong to
    /// * `locations` - Known sitemap locations; may be empty
    /// * `sink` - Receives each page as soon as its entry is read
    /// * `is_start_url` - True when the locations come from the start configuration
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Resolution finished; unreachable sitemaps are logged and skipped
    /// * `Err(CollectorError)` - The sink failed
    async fn resolve_sitemaps(
        &self,
        client: &HttpFetchClient,
        url_root: &str,
        locations: &[String],
        sink: &mut dyn SitemapSink,
        is_start_url: bool,
    ) -> crate::Result<()>;
}

/// Default resolver reading sitemaps and sitemap indexes
///
/// Each URL root is resolved at most once per run. When no location is known
/// for a root reached while crawling, locations are guessed from the root's
/// robots.txt `Sitemap:` lines, then `/sitemap.xml` and `/sitemap_index.xml`.
pub struct StandardSitemapResolver {
    robots: Option<Arc<dyn RobotsPolicy>>,
    resolved_roots: Mutex<HashSet<String>>,
}

impl StandardSitemapResolver {
    pub fn new() -> Self {
        Self {
            robots: None,
            resolved_roots: Mutex::new(HashSet::new()),
        }
    }

    /// Reads `Sitemap:` lines from robots.txt when guessing locations
    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    /// Returns true if the root was already resolved in this run
    pub async fn is_resolved(&self, url_root: &str) -> bool {
        self.resolved_roots.lock().await.contains(url_root)
    }

    async fn guess_locations(&self, url_root: &str) -> Vec<String> {
        let mut locations = match &self.robots {
            Some(robots) => robots.sitemaps(url_root).await,
            None => Vec::new(),
        };
        locations.push(format!("{}/sitemap.xml", url_root));
        locations.push(format!("{}/sitemap_index.xml", url_root));
        locations
    }
}

impl Default for StandardSitemapResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SitemapResolver for StandardSitemapResolver {
    async fn resolve_sitemaps(
        &self,
        client: &HttpFetchClient,
        url_root: &str,
        locations: &[String],
        sink: &mut dyn SitemapSink,
        is_start_url: bool,
    ) -> crate::Result<()> {
        {
            let mut resolved = self.resolved_roots.lock().await;
            if !resolved.insert(url_root.to_string()) && !is_start_url {
                return Ok(());
            }
        }

        let locations = if locations.is_empty() && !is_start_url {
            self.guess_locations(url_root).await
        } else {
            locations.to_vec()
        };

        // Depth-first over sitemap indexes
        let mut pending: Vec<String> = locations.into_iter().rev().collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut pages = 0usize;

        while let Some(location) = pending.pop() {
            if !seen.insert(location.clone()) {
                continue;
            }

            let response = client
                .fetch(&CrawlReference::new(location.clone(), 0), HttpMethod::Get)
                .await;
            let good = response.crawl_state().is_some_and(|s| s.is_good());
            let Some(document) = response.into_latest().filter(|_| good) else {
                tracing::debug!("No sitemap at {}", location);
                continue;
            };

            tracing::debug!("Reading sitemap {}", location);
            let mut parser = SitemapParser::new(&document.body, location.as_str());
            let mut children = Vec::new();
            loop {
                match parser.next_item() {
                    Ok(Some(SitemapItem::Url(reference))) => {
                        pages += 1;
                        sink.accept(reference).await?;
                    }
                    Ok(Some(SitemapItem::Sitemap(child))) => children.push(child),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Malformed sitemap {}: {}", location, e);
                        break;
                    }
                }
            }
            pending.extend(children.into_iter().rev());
        }

        tracing::info!("Resolved sitemaps of {}: {} pages", url_root, pages);
        Ok(())
    }
}
