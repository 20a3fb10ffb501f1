//! Crawler module: seeding and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - Queueing start URLs in a fixed order
//! - Worker tasks draining the crawl store queue
//! - Per-reference fetch, import and commit
//! - Orphan handling at the end of a run

mod coordinator;
mod seeds;

pub use coordinator::{Crawler, CrawlerBuilder, GoodRedirects};
pub use seeds::{read_seed_file, StartUrlSeeder, StartUrlsProvider, StaticStartUrls};

use crate::config::Config;
use crate::output::CrawlStatistics;
use crate::storage::{ResumeMode, SqliteStore};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs a complete crawl operation with the default components
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the crawl store, resuming an interrupted run unless `mode` is fresh
/// 2. Build the fetchers, robots policy, sitemap resolver, importer and committer
/// 3. Seed a fresh run with the start URLs
/// 4. Process references until the queue is drained or `cancel` fires
///
/// # Arguments
///
/// * `config` - The collector configuration
/// * `config_hash` - Hash of the configuration file, recorded with the run
/// * `mode` - Whether an interrupted run may be resumed
/// * `cancel` - Token stopping the crawl between two references
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - The crawl finished or was stopped
/// * `Err(CollectorError)` - Crawl failed
pub async fn run_crawl(
    config: Config,
    config_hash: &str,
    mode: ResumeMode,
    cancel: CancellationToken,
) -> crate::Result<CrawlStatistics> {
    let store = Arc::new(SqliteStore::open(
        Path::new(&config.store.path),
        mode,
        config_hash,
    )?);

    let crawler = Arc::new(
        Crawler::builder(config, store)
            .with_cancellation(cancel)
            .build()?,
    );
    crawler.run().await
}
