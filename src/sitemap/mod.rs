//! Sitemap support
//!
//! Sitemaps seed the crawl with start URLs and, while crawling, each newly
//! reached URL root has its sitemaps read once.

mod parser;
mod resolver;

pub use parser::{SitemapItem, SitemapParser};
pub use resolver::{SitemapResolver, StandardSitemapResolver};

use crate::state::CrawlReference;
use async_trait::async_trait;

/// Streaming consumer of sitemap pages
#[async_trait]
pub trait SitemapSink: Send {
    async fn accept(&mut self, reference: CrawlReference) -> crate::Result<()>;
}
