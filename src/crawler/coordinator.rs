//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the worker loop that drains the crawl store queue and
//! the per-reference processing:
//! - Fetching through the fetch client
//! - Change detection against the previous run
//! - Redirect and canonical handling
//! - Import, link queueing and commit
//! - Recovery of children of references that were not re-imported
//! - Orphan handling once the queue is drained

use crate::config::{Config, OrphansStrategy};
use crate::crawler::seeds::{StartUrlSeeder, StartUrlsProvider};
use crate::fetch::{
    build_http_client, DelayResolver, FetchClientConfig, GenericHttpFetcher, HttpFetchClient,
    HttpFetchResponse, HttpFetcher, HttpMethod,
};
use crate::output::{load_statistics, CrawlStatistics};
use crate::pipeline::{
    CommitDocument, Committer, HtmlImporter, ImportDisposition, ImportRequest, Importer,
    Metadata, QueuePipeline, SitemapStage, SqliteCommitter,
};
use crate::robots::{RobotsPolicy, RobotsTxtPolicy};
use crate::sitemap::{SitemapResolver, StandardSitemapResolver};
use crate::state::{CachedReference, CrawlReference, CrawlState};
use crate::storage::CrawlStore;
use crate::url::{ExclusionFilter, UrlNormalizer};
use crate::CollectorError;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Processed references between two progress log lines
const PROGRESS_INTERVAL: u64 = 50;

/// How long an idle worker waits before polling the queue again
const IDLE_POLL: Duration = Duration::from_millis(50);

/// References reached through a redirect that ended NEW or MODIFIED
///
/// A later redirect to one of them is not reported as a duplicate.
#[derive(Debug, Clone, Default)]
pub struct GoodRedirects(Arc<RwLock<HashSet<String>>>);

impl GoodRedirects {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, reference: &str) {
        if let Ok(mut set) = self.0.write() {
            set.insert(reference.to_string());
        }
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.0
            .read()
            .map(|set| set.contains(reference))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.read().map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assembles a [`Crawler`], filling in defaults from the configuration
///
/// Without overrides the crawler fetches with reqwest, honours robots.txt,
/// reads sitemaps, imports HTML and commits into the SQLite database of
/// `[committer] path`.
pub struct CrawlerBuilder {
    config: Config,
    store: Arc<dyn CrawlStore>,
    fetchers: Vec<Arc<dyn HttpFetcher>>,
    robots: Option<Arc<dyn RobotsPolicy>>,
    sitemap_resolver: Option<Arc<dyn SitemapResolver>>,
    importer: Option<Arc<dyn Importer>>,
    committer: Option<Arc<dyn Committer>>,
    providers: Vec<Arc<dyn StartUrlsProvider>>,
    good_redirects: GoodRedirects,
    cancel: CancellationToken,
}

impl CrawlerBuilder {
    /// Adds a fetcher; fetchers are tried in the order they were added
    pub fn with_fetcher(mut self, fetcher: Arc<dyn HttpFetcher>) -> Self {
        self.fetchers.push(fetcher);
        self
    }

    pub fn with_robots(mut self, robots: Arc<dyn RobotsPolicy>) -> Self {
        self.robots = Some(robots);
        self
    }

    pub fn with_sitemap_resolver(mut self, resolver: Arc<dyn SitemapResolver>) -> Self {
        self.sitemap_resolver = Some(resolver);
        self
    }

    pub fn with_importer(mut self, importer: Arc<dyn Importer>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_committer(mut self, committer: Arc<dyn Committer>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn with_start_urls_provider(mut self, provider: Arc<dyn StartUrlsProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_good_redirects(mut self, good_redirects: GoodRedirects) -> Self {
        self.good_redirects = good_redirects;
        self
    }

    /// Token that stops the crawl between two references when cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Builds the crawler
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Crawler ready to run
    /// * `Err(CollectorError)` - The HTTP client or the committer could not be created
    pub fn build(self) -> crate::Result<Crawler> {
        let crawler_config = &self.config.crawler;
        let timeout = Duration::from_millis(self.config.fetch.timeout_ms);
        let http = build_http_client(&self.config.user_agent, timeout)?;

        let robots: Arc<dyn RobotsPolicy> = match self.robots {
            Some(robots) => robots,
            None => Arc::new(RobotsTxtPolicy::new(
                http.clone(),
                self.config.user_agent.crawler_name.clone(),
                crawler_config.ignore_robots_txt,
            )),
        };

        let fetchers = if self.fetchers.is_empty() {
            let mut delay = DelayResolver::new(Duration::from_millis(crawler_config.min_delay_ms));
            if !crawler_config.ignore_robots_txt {
                delay = delay.with_robots(robots.clone());
            }
            let fetcher = GenericHttpFetcher::new(http, self.config.user_agent.header_value())
                .with_delay(Arc::new(delay));
            vec![Arc::new(fetcher) as Arc<dyn HttpFetcher>]
        } else {
            self.fetchers
        };
        let fetch_client = Arc::new(HttpFetchClient::new(
            fetchers,
            FetchClientConfig::from(&self.config.fetch),
        )?);

        let sitemap_resolver = if crawler_config.ignore_sitemap {
            None
        } else {
            Some(self.sitemap_resolver.unwrap_or_else(|| {
                Arc::new(StandardSitemapResolver::new().with_robots(robots.clone()))
            }))
        };

        let mut queue = QueuePipeline::new(
            self.store.clone(),
            UrlNormalizer::new(self.config.url_normalizer.clone()),
        )
        .with_exclusions(ExclusionFilter::new(&self.config.exclude))
        .with_robots(robots)
        .with_max_depth(crawler_config.max_depth);
        if let Some(resolver) = &sitemap_resolver {
            queue = queue.with_sitemaps(SitemapStage {
                resolver: resolver.clone(),
                client: fetch_client.clone(),
            });
        }

        let importer = self.importer.unwrap_or_else(|| {
            Arc::new(
                HtmlImporter::new(
                    crawler_config.ignore_robots_meta,
                    crawler_config.ignore_canonical_links,
                )
                .with_normalizer(queue.normalizer().clone()),
            )
        });

        let committer: Arc<dyn Committer> = match self.committer {
            Some(committer) => committer,
            None => Arc::new(SqliteCommitter::open(Path::new(&self.config.committer.path))?),
        };

        Ok(Crawler {
            config: self.config,
            store: self.store,
            fetch_client,
            queue,
            sitemap_resolver,
            importer,
            committer,
            providers: self.providers,
            good_redirects: self.good_redirects,
            cancel: self.cancel,
            orphans: Mutex::new(HashSet::new()),
            active: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            failed: AtomicBool::new(false),
            started: Instant::now(),
        })
    }
}

/// Main crawler structure
///
/// Workers share the crawler through an `Arc`. The crawl store is the only
/// state they coordinate through.
pub struct Crawler {
    config: Config,
    store: Arc<dyn CrawlStore>,
    fetch_client: Arc<HttpFetchClient>,
    queue: QueuePipeline,
    sitemap_resolver: Option<Arc<dyn SitemapResolver>>,
    importer: Arc<dyn Importer>,
    committer: Arc<dyn Committer>,
    providers: Vec<Arc<dyn StartUrlsProvider>>,
    good_redirects: GoodRedirects,
    cancel: CancellationToken,
    /// Cached references queued by the `process` orphans strategy
    orphans: Mutex<HashSet<String>>,
    /// Workers holding a reference (or about to pop one)
    active: AtomicUsize,
    processed: AtomicU64,
    /// Set when a worker hit a fatal error
    failed: AtomicBool,
    started: Instant,
}

impl Crawler {
    /// Starts building a crawler on top of a crawl store
    pub fn builder(config: Config, store: Arc<dyn CrawlStore>) -> CrawlerBuilder {
        CrawlerBuilder {
            config,
            store,
            fetchers: Vec::new(),
            robots: None,
            sitemap_resolver: None,
            importer: None,
            committer: None,
            providers: Vec::new(),
            good_redirects: GoodRedirects::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CrawlStore> {
        &self.store
    }

    pub fn good_redirects(&self) -> &GoodRedirects {
        &self.good_redirects
    }

    /// Token stopping the crawl; clones share the same state
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the crawl to completion or until stopped
    ///
    /// A fresh run is seeded with the start URLs; a resumed run continues
    /// from the persisted queue. The run is marked completed only when the
    /// queue was drained without a stop request.
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlStatistics)` - Statistics of the run, including stopped runs
    /// * `Err(CollectorError)` - A fatal (storage) error ended the run
    pub async fn run(self: &Arc<Self>) -> crate::Result<CrawlStatistics> {
        self.log_initialization();

        let start_urls = if self.store.is_resuming() {
            tracing::info!(
                "Resuming crawl with {} queued references",
                self.store.queue_size()?
            );
            None
        } else {
            Some(self.queue_start_urls().await?)
        };

        self.run_workers().await?;

        if !self.is_stopped() {
            self.handle_orphans().await?;
        }

        let processed = self.processed.load(Ordering::SeqCst);
        if self.is_stopped() {
            tracing::info!(
                "Crawl stopped after {} references in {:?}, the next start resumes it",
                processed,
                self.started.elapsed()
            );
        } else {
            self.store.complete_run()?;
            tracing::info!(
                "Crawl completed: {} references processed in {:?}",
                processed,
                self.started.elapsed()
            );
        }

        Ok(load_statistics(self.store.as_ref())?.with_start_urls(start_urls))
    }

    fn log_initialization(&self) {
        let crawler = &self.config.crawler;
        tracing::info!("Worker tasks: {}", crawler.num_threads);
        tracing::info!("RobotsTxt support: {}", !crawler.ignore_robots_txt);
        tracing::info!("RobotsMeta support: {}", !crawler.ignore_robots_meta);
        tracing::info!("Sitemap support: {}", !crawler.ignore_sitemap);
        tracing::info!("Canonical links support: {}", !crawler.ignore_canonical_links);
    }

    /// Queues the start URLs of a fresh run
    async fn queue_start_urls(&self) -> crate::Result<usize> {
        StartUrlSeeder {
            start: &self.config.start,
            queue: &self.queue,
            sitemap_resolver: self.sitemap_resolver.as_deref(),
            fetch_client: &self.fetch_client,
            providers: &self.providers,
        }
        .queue_start_urls()
        .await
    }

    fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.failed.load(Ordering::SeqCst)
    }

    /// Records a fatal error so every worker stops
    fn fail(&self, error: CollectorError) -> CollectorError {
        self.failed.store(true, Ordering::SeqCst);
        error
    }

    async fn run_workers(self: &Arc<Self>) -> crate::Result<()> {
        let workers = self.config.crawler.num_threads.max(1) as usize;
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let crawler = Arc::clone(self);
            handles.push(tokio::spawn(async move { crawler.worker_loop(id).await }));
        }

        let mut failure = None;
        for handle in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(self.fail(CollectorError::Crawler(format!(
                    "Worker task failed: {}",
                    e
                )))),
            };
            if let Err(e) = result {
                failure.get_or_insert(e);
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn worker_loop(self: &Arc<Self>, worker: usize) -> crate::Result<()> {
        tracing::debug!("Worker {} started", worker);

        while !self.is_stopped() {
            self.active.fetch_add(1, Ordering::SeqCst);
            let next = match self.store.next_queued() {
                Ok(next) => next,
                Err(e) => {
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    return Err(self.fail(e.into()));
                }
            };

            let Some(reference) = next else {
                let still_active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
                let queued = self
                    .store
                    .queue_size()
                    .map_err(|e| self.fail(e.into()))?;
                if still_active == 0 && queued == 0 {
                    break;
                }
                // Others may still enqueue
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(IDLE_POLL) => {}
                }
                continue;
            };

            let url = reference.reference.clone();
            let result = self.process_isolated(reference).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match result {
                Ok(done) => {
                    tracing::debug!("{} ended {}", url, done.state);
                    self.record_progress();
                }
                Err(e) => {
                    tracing::error!("Fatal error while processing {}: {}", url, e);
                    return Err(self.fail(e));
                }
            }
        }

        tracing::debug!("Worker {} finished", worker);
        Ok(())
    }

    fn record_progress(&self) {
        let processed = self.processed.fetch_add(1, Ordering::SeqCst) + 1;
        if processed % PROGRESS_INTERVAL == 0 {
            let rate = processed as f64 / self.started.elapsed().as_secs_f64();
            tracing::info!(
                "Progress: {} references processed, {} queued, {:.2} references/sec",
                processed,
                self.store.queue_size().unwrap_or(0),
                rate
            );
        }
    }

    /// Processes a reference on its own task
    ///
    /// A panic in a fetcher, importer or committer only fails that
    /// reference: it is recorded in the Error state and the crawl goes on.
    async fn process_isolated(
        self: &Arc<Self>,
        reference: CrawlReference,
    ) -> crate::Result<CrawlReference> {
        let mut failed = reference.clone();
        let crawler = Arc::clone(self);
        match tokio::spawn(async move { crawler.process_reference(reference).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Processing {} aborted: {}", failed.reference, e);
                failed.state = CrawlState::Error;
                failed.crawl_date = Some(Utc::now());
                self.store.processed(&failed)?;
                Ok(failed)
            }
        }
    }

    /// Processes a single reference and records it as processed
    ///
    /// Only fatal errors are returned. Anything else ends the reference in
    /// the Error state and the crawl goes on.
    async fn process_reference(
        &self,
        mut reference: CrawlReference,
    ) -> crate::Result<CrawlReference> {
        let cached = self.store.get_cached(&reference.reference)?;
        reference.state = CrawlState::Fetching;

        if let Some(cached) = &cached {
            reference.backfill_referrer_from(cached);
        }

        if let Err(e) = self.fetch_and_import(&mut reference, cached.as_ref()).await {
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!("Could not process {}: {}", reference.reference, e);
            reference.state = CrawlState::Error;
        }
        if !reference.state.is_terminal() || reference.state == CrawlState::Unsupported {
            reference.state = CrawlState::Error;
        }
        reference.crawl_date = Some(Utc::now());

        if let Some(cached) = &cached {
            if let Err(e) = self.recover_children(&mut reference, cached).await {
                if e.is_fatal() {
                    return Err(e);
                }
                tracing::warn!("Could not re-queue children of {}: {}", reference.reference, e);
                reference.state = CrawlState::Error;
            }
        }

        if !reference.redirect_trail.is_empty() && reference.state.is_new_or_modified() {
            self.good_redirects.insert(&reference.reference);
        }

        self.store.processed(&reference)?;
        if let Some(variation) = reference.original_variation() {
            self.store.processed(&variation)?;
        }

        Ok(reference)
    }

    async fn fetch_and_import(
        &self,
        reference: &mut CrawlReference,
        cached: Option<&CachedReference>,
    ) -> crate::Result<()> {
        let response = self.fetch_client.fetch(reference, HttpMethod::Get).await;
        let Some(document) = response.into_latest() else {
            reference.state = CrawlState::Error;
            return Ok(());
        };

        if document.status_code > 0 {
            reference.status_code = Some(document.status_code);
        }
        if document.content_type.is_some() {
            reference.content_type = document.content_type.clone();
        }

        match document.crawl_state {
            state if state.is_good() => self.import_document(reference, cached, document).await,
            CrawlState::Redirect => {
                self.follow_redirect(reference, document.redirect_target.as_deref())
                    .await
            }
            state @ (CrawlState::NotFound | CrawlState::Deleted) => {
                reference.state = state;
                self.remove_deleted(reference, cached).await;
                Ok(())
            }
            CrawlState::Unsupported => {
                tracing::debug!("No fetcher accepted {}", reference.reference);
                reference.state = CrawlState::Error;
                Ok(())
            }
            state => {
                tracing::debug!(
                    "{} ended {} ({} {})",
                    reference.reference,
                    state,
                    document.status_code,
                    document.reason_phrase.as_deref().unwrap_or("")
                );
                reference.state = state;
                Ok(())
            }
        }
    }

    async fn import_document(
        &self,
        reference: &mut CrawlReference,
        cached: Option<&CachedReference>,
        document: HttpFetchResponse,
    ) -> crate::Result<()> {
        if document.crawl_state == CrawlState::Unmodified {
            reference.state = CrawlState::Unmodified;
            reference.content_checksum = cached.and_then(|c| c.content_checksum.clone());
            if document.body.is_empty() {
                tracing::debug!("Not modified: {}", reference.reference);
                return Ok(());
            }
        } else {
            let checksum = hex::encode(Sha256::digest(&document.body));
            reference.state = match cached {
                None => CrawlState::New,
                Some(c) if c.content_checksum.as_deref() == Some(checksum.as_str()) => {
                    CrawlState::Unmodified
                }
                Some(_) => CrawlState::Modified,
            };
            reference.content_checksum = Some(checksum);
        }

        let metadata = build_metadata(reference);
        let response = self.importer.import(&ImportRequest {
            reference: &*reference,
            content: &document.body,
            content_type: document.content_type.as_deref(),
            metadata: &metadata,
            orphan: self.is_orphan(&reference.reference),
        });

        match response.disposition {
            ImportDisposition::Reject(reason) => {
                tracing::debug!("Rejected {}: {}", reference.reference, reason);
                reference.state = CrawlState::Rejected;
                if let Some(canonical) = response.canonical {
                    let target = CrawlReference::new(canonical, reference.depth)
                        .with_referrer(reference.reference.clone());
                    self.queue.execute(target).await?;
                }
                Ok(())
            }
            ImportDisposition::Error(message) => Err(CollectorError::Import {
                reference: reference.reference.clone(),
                message,
            }),
            ImportDisposition::Accept => {
                for link in response.links {
                    let mut child = CrawlReference::new(link.url.clone(), reference.depth + 1)
                        .with_referrer(reference.reference.clone());
                    child.referrer_link_tag = link.tag;
                    child.referrer_link_text = link.text;
                    child.referrer_link_title = link.title;
                    reference.referenced_urls.insert(link.url);
                    self.queue.execute(child).await?;
                }

                if reference.state.is_new_or_modified() {
                    let commit = CommitDocument {
                        reference: reference.reference.clone(),
                        content: response.content,
                        metadata: response.metadata,
                        checksum: reference.content_checksum.clone(),
                    };
                    if let Err(e) = self.committer.commit(&commit, cached).await {
                        tracing::error!("Could not commit {}: {}", reference.reference, e);
                        reference.state = CrawlState::Error;
                    }
                }
                Ok(())
            }
        }
    }

    /// Queues the target of a redirect in place of its source
    async fn follow_redirect(
        &self,
        reference: &mut CrawlReference,
        target: Option<&str>,
    ) -> crate::Result<()> {
        let Some(target) = target else {
            reference.state = CrawlState::BadStatus;
            return Ok(());
        };
        reference.state = CrawlState::Redirect;

        let target_key = match self.queue.normalizer().normalize_str(target) {
            Ok(key) => key,
            Err(e) => {
                tracing::debug!("Invalid redirect target from {}: {}", reference.reference, e);
                reference.state = CrawlState::Error;
                return Ok(());
            }
        };

        if target_key == reference.reference || reference.redirect_trail.contains(&target_key) {
            tracing::warn!("Redirect loop detected at {}", reference.reference);
            reference.state = CrawlState::Rejected;
            return Ok(());
        }

        if self.store.is_processed(&target_key)? {
            if self.good_redirects.contains(&target_key) {
                tracing::debug!(
                    "Redirect target {} already processed through another redirect",
                    target_key
                );
            } else {
                tracing::debug!(
                    "Rejecting {}: redirect target {} already processed",
                    reference.reference,
                    target_key
                );
                reference.state = CrawlState::Rejected;
            }
            return Ok(());
        }

        let mut next = CrawlReference::new(target, reference.depth);
        next.referrer_reference = reference.referrer_reference.clone();
        next.referrer_link_tag = reference.referrer_link_tag.clone();
        next.referrer_link_text = reference.referrer_link_text.clone();
        next.referrer_link_title = reference.referrer_link_title.clone();
        next.redirect_trail = reference.redirect_trail.clone();
        next.redirect_trail.push(reference.reference.clone());

        tracing::debug!("Redirect: {} -> {}", reference.reference, target_key);
        self.queue.execute(next).await?;
        Ok(())
    }

    /// Removes a document that disappeared since the previous run
    async fn remove_deleted(&self, reference: &CrawlReference, cached: Option<&CachedReference>) {
        let Some(cached) = cached.filter(|c| c.state.is_good()) else {
            return;
        };
        match self.committer.remove(&reference.reference, Some(cached)).await {
            Ok(()) => tracing::info!("Removed deleted document {}", reference.reference),
            Err(e) => tracing::error!("Could not remove {}: {}", reference.reference, e),
        }
    }

    /// Re-queues the children known from the previous run
    ///
    /// Applies when this run extracted no links because the reference was
    /// skipped or failed. Only the direct children are re-queued.
    async fn recover_children(
        &self,
        reference: &mut CrawlReference,
        cached: &CachedReference,
    ) -> crate::Result<()> {
        if !reference.referenced_urls.is_empty() || cached.referenced_urls.is_empty() {
            return Ok(());
        }
        if !(reference.state.is_skipped()
            || reference
                .state
                .is_one_of(&[CrawlState::BadStatus, CrawlState::Error]))
        {
            return Ok(());
        }

        let mut requeued = 0;
        for url in &cached.referenced_urls {
            let child = CrawlReference::new(url.clone(), reference.depth + 1)
                .with_referrer(reference.reference.clone());
            if self.queue.execute(child).await?.is_queued() {
                requeued += 1;
            }
        }
        reference.referenced_urls = cached.referenced_urls.clone();

        tracing::debug!(
            "Re-queued {} of {} cached children of {}",
            requeued,
            cached.referenced_urls.len(),
            reference.reference
        );
        Ok(())
    }

    fn is_orphan(&self, reference: &str) -> bool {
        self.orphans
            .lock()
            .map(|orphans| orphans.contains(reference))
            .unwrap_or(false)
    }

    /// Applies the orphans strategy to cached references not reached this run
    async fn handle_orphans(self: &Arc<Self>) -> crate::Result<()> {
        let strategy = self.config.crawler.orphans_strategy;
        if strategy == OrphansStrategy::Ignore {
            return Ok(());
        }

        let orphans = self.store.cached_references()?;
        if orphans.is_empty() {
            return Ok(());
        }

        match strategy {
            OrphansStrategy::Ignore => Ok(()),
            OrphansStrategy::Process => {
                tracing::info!("Processing {} orphan references", orphans.len());
                let mut queued = 0;
                for orphan in &orphans {
                    if let Ok(mut set) = self.orphans.lock() {
                        set.insert(orphan.reference.clone());
                    }
                    let mut reference = CrawlReference::new(orphan.reference.clone(), orphan.depth);
                    reference.referrer_reference = orphan.referrer_reference.clone();
                    reference.referrer_link_tag = orphan.referrer_link_tag.clone();
                    reference.referrer_link_text = orphan.referrer_link_text.clone();
                    reference.referrer_link_title = orphan.referrer_link_title.clone();
                    reference.sitemap_change_freq = orphan.sitemap_change_freq.clone();
                    reference.sitemap_last_mod = orphan.sitemap_last_mod;
                    reference.sitemap_priority = orphan.sitemap_priority;
                    if self.queue.admit(reference).await?.is_queued() {
                        queued += 1;
                    }
                }
                tracing::debug!("Queued {} orphan references", queued);
                self.run_workers().await
            }
            OrphansStrategy::Delete => {
                tracing::info!("Deleting {} orphan references", orphans.len());
                for orphan in orphans {
                    if let Err(e) = self.committer.remove(&orphan.reference, Some(&orphan)).await {
                        tracing::error!("Could not remove orphan {}: {}", orphan.reference, e);
                    }
                    let mut deleted = orphan;
                    deleted.state = CrawlState::Deleted;
                    deleted.crawl_date = Some(Utc::now());
                    self.store.processed(&deleted)?;
                }
                Ok(())
            }
        }
    }
}

/// Metadata handed to the importer, prefixed with `collector.`
fn build_metadata(reference: &CrawlReference) -> Metadata {
    let mut metadata = Metadata::new();
    let mut put = |key: &str, value: String| {
        metadata.insert(format!("collector.{}", key), vec![value]);
    };

    put("reference", reference.reference.clone());
    put("depth", reference.depth.to_string());
    if let Some(referrer) = &reference.referrer_reference {
        put("referrer-reference", referrer.clone());
    }
    if let Some(tag) = &reference.referrer_link_tag {
        put("referrer-link-tag", tag.clone());
    }
    if let Some(text) = &reference.referrer_link_text {
        put("referrer-link-text", text.clone());
    }
    if let Some(title) = &reference.referrer_link_title {
        put("referrer-link-title", title.clone());
    }
    if let Some(freq) = &reference.sitemap_change_freq {
        put("sitemap-changefreq", freq.clone());
    }
    if let Some(last_mod) = &reference.sitemap_last_mod {
        put("sitemap-lastmod", last_mod.to_rfc3339());
    }
    if let Some(priority) = reference.sitemap_priority {
        put("sitemap-priority", priority.to_string());
    }
    if let Some(status) = reference.status_code {
        put("status-code", status.to_string());
    }
    if let Some(content_type) = &reference.content_type {
        put("content-type", content_type.clone());
    }
    if let Some(checksum) = &reference.content_checksum {
        put("checksum", checksum.clone());
    }
    if !reference.redirect_trail.is_empty() {
        metadata.insert(
            "collector.redirect-trail".to_string(),
            reference.redirect_trail.clone(),
        );
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::pipeline::ImportResponse;
    use crate::storage::{ResumeMode, SqliteStore};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Fetcher serving a fixed set of pages
    #[derive(Default)]
    struct SiteFetcher {
        pages: HashMap<String, HttpFetchResponse>,
        failing: HashSet<String>,
    }

    impl SiteFetcher {
        fn page(mut self, url: &str, links: &[&str]) -> Self {
            self.pages.insert(url.to_string(), html(links));
            self
        }

        fn respond(mut self, url: &str, response: HttpFetchResponse) -> Self {
            self.pages.insert(url.to_string(), response);
            self
        }

        fn fail(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }
    }

    #[async_trait]
    impl HttpFetcher for SiteFetcher {
        fn id(&self) -> &str {
            "site"
        }

        async fn fetch(
            &self,
            reference: &CrawlReference,
            _method: HttpMethod,
        ) -> Result<HttpFetchResponse, FetchError> {
            if self.failing.contains(&reference.reference) {
                return Err(FetchError::InvalidUrl(reference.reference.clone()));
            }
            Ok(self
                .pages
                .get(&reference.reference)
                .cloned()
                .unwrap_or_else(|| HttpFetchResponse::new(CrawlState::NotFound, 404)))
        }
    }

    fn html(links: &[&str]) -> HttpFetchResponse {
        let anchors: String = links
            .iter()
            .map(|link| format!("<a href=\"{}\" title=\"go\">Link</a>", link))
            .collect();
        HttpFetchResponse::new(CrawlState::New, 200)
            .with_content_type("text/html")
            .with_body(format!(
                "<html><head><title>Page</title></head><body>{}</body></html>",
                anchors
            ))
    }

    fn test_config(urls: &[&str]) -> Config {
        let mut config = Config::default();
        config.crawler.num_threads = 1;
        config.crawler.ignore_robots_txt = true;
        config.crawler.ignore_sitemap = true;
        config.crawler.min_delay_ms = 0;
        config.fetch.max_retries = 0;
        config.fetch.retry_delay_ms = 0;
        config.start.urls = urls.iter().map(|u| u.to_string()).collect();
        config
    }

    fn build(
        config: Config,
        store: Arc<dyn CrawlStore>,
        site: SiteFetcher,
        committer: Arc<SqliteCommitter>,
    ) -> Arc<Crawler> {
        Arc::new(
            Crawler::builder(config, store)
                .with_fetcher(Arc::new(site))
                .with_committer(committer)
                .build()
                .unwrap(),
        )
    }

    fn state_of(store: &dyn CrawlStore, url: &str) -> CrawlState {
        store.get(url).unwrap().unwrap().state
    }

    #[tokio::test]
    async fn test_crawl_follows_links_and_commits() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .page("https://example.com/", &["https://example.com/a", "https://example.com/b"])
            .page("https://example.com/a", &["https://example.com/", "https://example.com/b"])
            .page("https://example.com/b", &[]);

        let mut config = test_config(&["https://example.com/"]);
        config.crawler.num_threads = 3;
        let crawler = build(config, store.clone(), site, committer.clone());
        let stats = crawler.run().await.unwrap();

        assert_eq!(stats.start_urls, Some(1));
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.count(CrawlState::New), 3);
        assert_eq!(committer.count().unwrap(), 3);

        let a = store.get("https://example.com/a").unwrap().unwrap();
        assert_eq!(a.depth, 1);
        assert_eq!(a.referrer_reference.as_deref(), Some("https://example.com/"));
        assert_eq!(a.referrer_link_title.as_deref(), Some("go"));
        assert!(a.content_checksum.is_some());
    }

    #[tokio::test]
    async fn test_max_depth_limits_crawl() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .page("https://example.com/", &["https://example.com/a"])
            .page("https://example.com/a", &["https://example.com/b"]);

        let mut config = test_config(&["https://example.com/"]);
        config.crawler.max_depth = Some(1);
        build(config, store.clone(), site, committer).run().await.unwrap();

        assert!(store.is_processed("https://example.com/a").unwrap());
        assert!(store.get("https://example.com/b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_variation_closure() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default().page("https://example.com/page", &[]);

        let config = test_config(&["https://Example.com/page#top"]);
        build(config, store.clone(), site, committer).run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/page"), CrawlState::New);
        assert!(store.is_processed("https://Example.com/page#top").unwrap());
    }

    #[tokio::test]
    async fn test_single_failure_does_not_stop_crawl() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .page("https://example.com/", &["https://example.com/bad", "https://example.com/ok"])
            .page("https://example.com/ok", &[])
            .fail("https://example.com/bad");

        let config = test_config(&["https://example.com/"]);
        let stats = build(config, store.clone(), site, committer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/bad"), CrawlState::Error);
        assert_eq!(state_of(store.as_ref(), "https://example.com/ok"), CrawlState::New);
        assert_eq!(stats.processed, 3);
        assert_eq!(committer.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_import_error_ends_in_error_state() {
        struct FailingImporter;

        impl Importer for FailingImporter {
            fn import(&self, _request: &ImportRequest<'_>) -> ImportResponse {
                ImportResponse::error("broken document")
            }
        }

        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default().page("https://example.com/", &[]);

        let crawler = Arc::new(
            Crawler::builder(test_config(&["https://example.com/"]), store.clone())
                .with_fetcher(Arc::new(site))
                .with_importer(Arc::new(FailingImporter))
                .with_committer(committer.clone())
                .build()
                .unwrap(),
        );
        crawler.run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/"), CrawlState::Error);
        assert_eq!(committer.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_redirect_queues_target_with_trail() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .respond(
                "https://example.com/old",
                HttpFetchResponse::new(CrawlState::Redirect, 301)
                    .with_redirect_target("https://example.com/new"),
            )
            .page("https://example.com/new", &[]);

        let crawler = build(
            test_config(&["https://example.com/old"]),
            store.clone(),
            site,
            committer,
        );
        crawler.run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/old"), CrawlState::Redirect);
        let target = store.get("https://example.com/new").unwrap().unwrap();
        assert_eq!(target.state, CrawlState::New);
        assert_eq!(target.depth, 0);
        assert_eq!(target.redirect_trail, vec!["https://example.com/old".to_string()]);
        assert!(crawler.good_redirects().contains("https://example.com/new"));
    }

    #[tokio::test]
    async fn test_redirect_to_processed_page_is_rejected() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .page("https://example.com/new", &[])
            .respond(
                "https://example.com/old",
                HttpFetchResponse::new(CrawlState::Redirect, 301)
                    .with_redirect_target("https://example.com/new"),
            );

        let config = test_config(&["https://example.com/new", "https://example.com/old"]);
        build(config, store.clone(), site, committer).run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/old"), CrawlState::Rejected);
    }

    #[tokio::test]
    async fn test_redirect_to_good_redirect_target_stays_redirect() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let redirect = HttpFetchResponse::new(CrawlState::Redirect, 302)
            .with_redirect_target("https://example.com/new");
        let site = SiteFetcher::default()
            .respond("https://example.com/one", redirect.clone())
            .respond("https://example.com/two", redirect)
            .page("https://example.com/new", &["https://example.com/two"]);

        let config = test_config(&["https://example.com/one"]);
        build(config, store.clone(), site, committer).run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/one"), CrawlState::Redirect);
        assert_eq!(state_of(store.as_ref(), "https://example.com/two"), CrawlState::Redirect);
    }

    #[tokio::test]
    async fn test_canonical_link_is_queued_and_page_rejected() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let page = HttpFetchResponse::new(CrawlState::New, 200)
            .with_content_type("text/html")
            .with_body(
                r#"<html><head><link rel="canonical" href="https://example.com/main"></head><body></body></html>"#,
            );
        let site = SiteFetcher::default()
            .respond("https://example.com/copy", page)
            .page("https://example.com/main", &[]);

        let config = test_config(&["https://example.com/copy"]);
        build(config, store.clone(), site, committer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/copy"), CrawlState::Rejected);
        assert_eq!(state_of(store.as_ref(), "https://example.com/main"), CrawlState::New);
        assert_eq!(committer.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_crawl_is_not_completed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());

        {
            let store: Arc<dyn CrawlStore> =
                Arc::new(SqliteStore::open(&path, ResumeMode::Auto, "test").unwrap());
            let site = SiteFetcher::default().page("https://example.com/", &[]);
            let crawler = build(
                test_config(&["https://example.com/"]),
                store.clone(),
                site,
                committer.clone(),
            );
            crawler.cancellation_token().cancel();
            let stats = crawler.run().await.unwrap();
            assert_eq!(stats.processed, 0);
            assert_eq!(stats.queued, 1);
        }

        let store = SqliteStore::open(&path, ResumeMode::Auto, "test").unwrap();
        assert!(store.is_resuming());
        assert_eq!(store.queue_size().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_children_recovered_when_parent_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());

        {
            let store: Arc<dyn CrawlStore> =
                Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
            let site = SiteFetcher::default()
                .page("https://example.com/", &["https://example.com/child"])
                .page("https://example.com/child", &[]);
            build(test_config(&["https://example.com/"]), store, site, committer.clone())
                .run()
                .await
                .unwrap();
        }

        let store: Arc<dyn CrawlStore> =
            Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
        let site = SiteFetcher::default()
            .respond("https://example.com/", HttpFetchResponse::new(CrawlState::BadStatus, 500))
            .page("https://example.com/child", &[]);
        build(test_config(&["https://example.com/"]), store.clone(), site, committer)
            .run()
            .await
            .unwrap();

        let parent = store.get("https://example.com/").unwrap().unwrap();
        assert_eq!(parent.state, CrawlState::BadStatus);
        assert!(parent.referenced_urls.contains("https://example.com/child"));

        let child = store.get("https://example.com/child").unwrap().unwrap();
        assert_eq!(child.state, CrawlState::Unmodified);
        assert_eq!(child.depth, 1);
        assert_eq!(child.referrer_reference.as_deref(), Some("https://example.com/"));
    }

    #[tokio::test]
    async fn test_orphans_delete_strategy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());

        {
            let store: Arc<dyn CrawlStore> =
                Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
            let site = SiteFetcher::default()
                .page("https://example.com/", &["https://example.com/gone"])
                .page("https://example.com/gone", &[]);
            build(test_config(&["https://example.com/"]), store, site, committer.clone())
                .run()
                .await
                .unwrap();
        }
        assert_eq!(committer.count().unwrap(), 2);

        let store: Arc<dyn CrawlStore> =
            Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
        let site = SiteFetcher::default().page("https://example.com/", &[]);
        let mut config = test_config(&["https://example.com/"]);
        config.crawler.orphans_strategy = OrphansStrategy::Delete;
        build(config, store.clone(), site, committer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/"), CrawlState::Modified);
        assert_eq!(state_of(store.as_ref(), "https://example.com/gone"), CrawlState::Deleted);
        assert!(committer.get("https://example.com/gone").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_orphans_process_strategy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl.db");
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());

        {
            let store: Arc<dyn CrawlStore> =
                Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
            let site = SiteFetcher::default()
                .page("https://example.com/", &["https://example.com/orphan"])
                .page("https://example.com/orphan", &[]);
            build(test_config(&["https://example.com/"]), store, site, committer.clone())
                .run()
                .await
                .unwrap();
        }

        let store: Arc<dyn CrawlStore> =
            Arc::new(SqliteStore::open(&path, ResumeMode::Fresh, "test").unwrap());
        let site = SiteFetcher::default()
            .page("https://example.com/", &[])
            .page("https://example.com/orphan", &[]);
        let mut config = test_config(&["https://example.com/"]);
        config.crawler.orphans_strategy = OrphansStrategy::Process;
        build(config, store.clone(), site, committer)
            .run()
            .await
            .unwrap();

        let orphan = store.get("https://example.com/orphan").unwrap().unwrap();
        assert_eq!(orphan.state, CrawlState::Unmodified);
        assert_eq!(orphan.depth, 1);
    }

    #[tokio::test]
    async fn test_panicking_importer_only_fails_its_reference() {
        struct FragileImporter(HtmlImporter);

        impl Importer for FragileImporter {
            fn import(&self, request: &ImportRequest<'_>) -> ImportResponse {
                if request.reference.reference.ends_with("/fragile") {
                    panic!("importer bug");
                }
                self.0.import(request)
            }
        }

        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let site = SiteFetcher::default()
            .page(
                "https://example.com/",
                &["https://example.com/fragile", "https://example.com/ok"],
            )
            .page("https://example.com/fragile", &[])
            .page("https://example.com/ok", &[]);

        let mut config = test_config(&["https://example.com/"]);
        config.crawler.num_threads = 2;
        let crawler = Arc::new(
            Crawler::builder(config, store.clone())
                .with_fetcher(Arc::new(site))
                .with_importer(Arc::new(FragileImporter(HtmlImporter::default())))
                .with_committer(committer.clone())
                .build()
                .unwrap(),
        );
        let stats = crawler.run().await.unwrap();

        assert_eq!(state_of(store.as_ref(), "https://example.com/fragile"), CrawlState::Error);
        assert_eq!(state_of(store.as_ref(), "https://example.com/ok"), CrawlState::New);
        assert!(!store.is_active("https://example.com/fragile").unwrap());
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.active, 0);
        assert_eq!(committer.count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_canonical_naming_the_page_itself_is_committed() {
        let store: Arc<dyn CrawlStore> = Arc::new(SqliteStore::new_in_memory().unwrap());
        let committer = Arc::new(SqliteCommitter::new_in_memory().unwrap());
        let page = HttpFetchResponse::new(CrawlState::New, 200)
            .with_content_type("text/html")
            .with_body(
                r#"<html><head><link rel="canonical" href="https://example.com/p?b=2&amp;a=1"></head></html>"#,
            );
        let site = SiteFetcher::default().respond("https://example.com/p?a=1&b=2", page);

        let config = test_config(&["https://example.com/p?a=1&b=2"]);
        build(config, store.clone(), site, committer.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(
            state_of(store.as_ref(), "https://example.com/p?a=1&b=2"),
            CrawlState::New
        );
        assert_eq!(committer.count().unwrap(), 1);
    }

    #[test]
    fn test_build_metadata() {
        let mut reference = CrawlReference::new("https://example.com/b", 2)
            .with_referrer("https://example.com/a");
        reference.referrer_link_text = Some("Next".to_string());
        reference.redirect_trail = vec!["https://example.com/x".to_string()];

        let metadata = build_metadata(&reference);

        assert_eq!(metadata["collector.depth"], vec!["2"]);
        assert_eq!(metadata["collector.referrer-link-text"], vec!["Next"]);
        assert_eq!(metadata["collector.redirect-trail"], vec!["https://example.com/x"]);
        assert!(!metadata.contains_key("collector.checksum"));
    }

    #[test]
    fn test_good_redirects_registry() {
        let registry = GoodRedirects::new();
        let shared = registry.clone();
        shared.insert("https://example.com/");

        assert!(registry.contains("https://example.com/"));
        assert_eq!(registry.len(), 1);
    }
}
