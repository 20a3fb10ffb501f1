//! Queue pipeline: decides whether a candidate reference enters the queue

use crate::fetch::HttpFetchClient;
use crate::robots::RobotsPolicy;
use crate::sitemap::{SitemapResolver, SitemapSink};
use crate::state::{CrawlReference, CrawlState};
use crate::storage::CrawlStore;
use crate::url::{root_of, ExclusionFilter, UrlNormalizer};
use async_trait::async_trait;
use std::sync::Arc;

/// Why a candidate was not queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Not a valid HTTP(S) URL
    Invalid,
    /// Excluded by a reference filter
    Filtered,
    /// Already known to this run
    Duplicate,
    /// Disallowed by robots.txt
    Robots,
    /// Deeper than the maximum depth
    Depth,
}

/// Outcome of running a candidate through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Queued,
    Dropped(DropReason),
}

impl QueueOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Sitemap stage settings: which resolver reads sitemaps, through which client
pub struct SitemapStage {
    pub resolver: Arc<dyn SitemapResolver>,
    pub client: Arc<HttpFetchClient>,
}

/// Runs candidate references through normalization, filtering, sitemap
/// discovery, deduplication, robots rules and depth checks, then queues them
///
/// Drops are reported as outcomes, never as errors. Only storage and sink
/// failures surface as `Err`.
pub struct QueuePipeline {
    store: Arc<dyn CrawlStore>,
    normalizer: UrlNormalizer,
    exclusions: ExclusionFilter,
    robots: Option<Arc<dyn RobotsPolicy>>,
    max_depth: Option<u32>,
    sitemaps: Option<SitemapStage>,
}

impl QueuePipeline {
    pub fn new(store: Arc<dyn CrawlStore>, normalizer: UrlNormalizer) -> Self {
        Self {
            store,
            normalizer,
            exclusions: ExclusionFilter::default(),
            robots: None,
            max_depth: None,
            sitemaps: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionFilter) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn with_max_depth(mut self, max_depth: Option<u32>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_sitemaps(mut self, stage: SitemapStage) -> Self {
        self.sitemaps = Some(stage);
        self
    }

    pub fn normalizer(&self) -> &UrlNormalizer {
        &self.normalizer
    }

    /// Runs a candidate through every stage
    pub async fn execute(&self, reference: CrawlReference) -> crate::Result<QueueOutcome> {
        self.run(reference, true).await
    }

    /// Same as [`execute`](Self::execute) without the sitemap stage
    ///
    /// Used for sitemap entries so reading a sitemap never triggers another
    /// sitemap resolution.
    pub async fn admit(&self, reference: CrawlReference) -> crate::Result<QueueOutcome> {
        self.run(reference, false).await
    }

    async fn run(
        &self,
        mut reference: CrawlReference,
        with_sitemaps: bool,
    ) -> crate::Result<QueueOutcome> {
        let url = match self.normalizer.normalize(&reference.reference) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Dropping invalid reference '{}': {}", reference.reference, e);
                return Ok(QueueOutcome::Dropped(DropReason::Invalid));
            }
        };
        let normalized = url.to_string();
        if normalized != reference.reference {
            if reference.original_reference.is_none() {
                reference.original_reference = Some(reference.reference.clone());
            }
            reference.reference = normalized;
        }

        if self.exclusions.is_excluded(&url) {
            tracing::debug!("Excluded by domain filter: {}", reference.reference);
            return Ok(QueueOutcome::Dropped(DropReason::Filtered));
        }

        if with_sitemaps {
            if let (Some(stage), Some(root)) = (&self.sitemaps, root_of(&url)) {
                let mut sink = AdmitSink {
                    pipeline: self,
                    queued: 0,
                };
                stage
                    .resolver
                    .resolve_sitemaps(&stage.client, &root, &[], &mut sink, false)
                    .await?;
                if sink.queued > 0 {
                    tracing::debug!("Queued {} references from sitemaps of {}", sink.queued, root);
                }
            }
        }

        if self.is_known(&reference.reference)? {
            return Ok(QueueOutcome::Dropped(DropReason::Duplicate));
        }

        if let Some(robots) = &self.robots {
            if !robots.is_ignored() && !robots.is_allowed(&url).await {
                tracing::debug!("Disallowed by robots.txt: {}", reference.reference);
                return Ok(QueueOutcome::Dropped(DropReason::Robots));
            }
        }

        if let Some(max_depth) = self.max_depth {
            if reference.depth > max_depth {
                tracing::debug!(
                    "Too deep ({} > {}): {}",
                    reference.depth,
                    max_depth,
                    reference.reference
                );
                return Ok(QueueOutcome::Dropped(DropReason::Depth));
            }
        }

        reference.state = CrawlState::Queued;
        if self.store.queued(&reference)? {
            tracing::debug!("Queued {} (depth {})", reference.reference, reference.depth);
            Ok(QueueOutcome::Queued)
        } else {
            Ok(QueueOutcome::Dropped(DropReason::Duplicate))
        }
    }

    fn is_known(&self, reference: &str) -> crate::Result<bool> {
        Ok(self.store.is_processed(reference)?
            || self.store.is_queued(reference)?
            || self.store.is_active(reference)?)
    }
}

/// Feeds sitemap entries back into the pipeline
struct AdmitSink<'a> {
    pipeline: &'a QueuePipeline,
    queued: usize,
}

#[async_trait]
impl SitemapSink for AdmitSink<'_> {
    async fn accept(&mut self, reference: CrawlReference) -> crate::Result<()> {
        if self.pipeline.admit(reference).await?.is_queued() {
            self.queued += 1;
        }
        Ok(())
    }
}
