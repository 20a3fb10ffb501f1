//! Start URL seeding
//!
//! Start URLs are queued in a fixed order: sitemaps first, then explicit
//! URLs, then URL files, then providers. Sitemaps go first because a declared
//! sitemap is trusted more than the `/sitemap.xml` guess made later for each
//! newly reached URL root.

use crate::config::StartConfig;
use crate::fetch::HttpFetchClient;
use crate::pipeline::QueuePipeline;
use crate::sitemap::{SitemapResolver, SitemapSink};
use crate::state::CrawlReference;
use crate::url::url_root;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Source of start URLs computed at run time
pub trait StartUrlsProvider: Send + Sync {
    fn provide_start_urls(&self) -> Box<dyn Iterator<Item = String> + Send + '_>;
}

/// Provider returning a fixed list of URLs
#[derive(Debug, Clone, Default)]
pub struct StaticStartUrls(pub Vec<String>);

impl StartUrlsProvider for StaticStartUrls {
    fn provide_start_urls(&self) -> Box<dyn Iterator<Item = String> + Send + '_> {
        Box::new(self.0.iter().cloned())
    }
}

/// Queues every start URL of a fresh run at depth 0
pub struct StartUrlSeeder<'a> {
    pub start: &'a StartConfig,
    pub queue: &'a QueuePipeline,
    pub sitemap_resolver: Option<&'a dyn SitemapResolver>,
    pub fetch_client: &'a HttpFetchClient,
    pub providers: &'a [Arc<dyn StartUrlsProvider>],
}

impl StartUrlSeeder<'_> {
    /// Queues all start URLs and returns how many were identified
    ///
    /// Blank entries and comment lines are not counted. A missing sitemap
    /// resolver or an unreadable URL file is logged and contributes nothing.
    pub async fn queue_start_urls(&self) -> crate::Result<usize> {
        let mut count = self.queue_sitemaps().await?;
        count += self.queue_regular().await?;
        count += self.queue_seed_files().await?;
        count += self.queue_providers().await?;
        tracing::info!("{} start URLs identified", count);
        Ok(count)
    }

    async fn queue_sitemaps(&self) -> crate::Result<usize> {
        if self.start.sitemaps.is_empty() {
            return Ok(0);
        }

        // Group by URL root, keeping first-seen order
        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for location in &self.start.sitemaps {
            let Some(root) = url_root(location) else {
                tracing::error!("Invalid sitemap start URL: {}", location);
                continue;
            };
            match groups.iter_mut().find(|(r, _)| *r == root) {
                Some((_, locations)) => locations.push(location.clone()),
                None => groups.push((root, vec![location.clone()])),
            }
        }

        let Some(resolver) = self.sitemap_resolver else {
            tracing::error!(
                "No sitemap resolver configured, {} sitemap start URLs cannot be resolved",
                self.start.sitemaps.len()
            );
            return Ok(0);
        };

        let mut sink = SeedSink {
            queue: self.queue,
            count: 0,
        };
        for (root, locations) in &groups {
            resolver
                .resolve_sitemaps(self.fetch_client, root, locations, &mut sink, true)
                .await?;
        }
        Ok(sink.count)
    }

    async fn queue_regular(&self) -> crate::Result<usize> {
        let mut count = 0;
        for url in &self.start.urls {
            let url = url.trim();
            if url.is_empty() {
                tracing::debug!("Blank start URL encountered, ignoring it");
                continue;
            }
            self.queue.execute(CrawlReference::new(url, 0)).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn queue_seed_files(&self) -> crate::Result<usize> {
        let mut count = 0;
        for path in &self.start.url_files {
            let urls = match read_seed_file(path) {
                Ok(urls) => urls,
                Err(e) => {
                    tracing::error!("Could not read start URL file {}: {}", path.display(), e);
                    continue;
                }
            };
            for url in urls {
                self.queue.execute(CrawlReference::new(url, 0)).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn queue_providers(&self) -> crate::Result<usize> {
        let mut count = 0;
        for provider in self.providers {
            for url in provider.provide_start_urls() {
                let url = url.trim();
                if url.is_empty() {
                    continue;
                }
                self.queue.execute(CrawlReference::new(url, 0)).await?;
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Reads a start URL file: one URL per line, blank and `#` lines ignored
pub fn read_seed_file(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

struct SeedSink<'a> {
    queue: &'a QueuePipeline,
    count: usize,
}

#[async_trait]
impl SitemapSink for SeedSink<'_> {
    async fn accept(&mut self, reference: CrawlReference) -> crate::Result<()> {
        self.queue.execute(reference).await?;
        self.count += 1;
        Ok(())
    }
}
