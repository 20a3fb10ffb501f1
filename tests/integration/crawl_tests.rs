//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and run the full
//! crawl cycle end-to-end with the default components.

use ripple_collector::config::{Config, UserAgentConfig};
use ripple_collector::crawler::run_crawl;
use ripple_collector::pipeline::SqliteCommitter;
use ripple_collector::state::CrawlState;
use ripple_collector::storage::{CrawlStore, ResumeMode, SqliteStore};
use std::path::Path;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration storing everything in `dir`
fn create_test_config(dir: &TempDir, start_urls: Vec<String>) -> Config {
    let mut config = Config::default();
    config.crawler.num_threads = 2;
    config.crawler.min_delay_ms = 0; // No politeness delay against the mock server
    config.fetch.max_retries = 0;
    config.fetch.retry_delay_ms = 0;
    config.fetch.timeout_ms = 5_000;
    config.user_agent = UserAgentConfig {
        crawler_name: "TestBot".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    };
    config.start.urls = start_urls;
    config.store.path = dir.path().join("crawl.db").to_string_lossy().into_owned();
    config.committer.path = dir.path().join("documents.db").to_string_lossy().into_owned();
    config
}

fn html_page(title: &str, links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">{}</a>"#, link, link))
        .collect();
    ResponseTemplate::new(200)
        .set_body_raw(
            format!(
                "<html><head><title>{}</title></head><body>{}</body></html>",
                title, anchors
            ),
            "text/html",
        )
}

async fn mount_page(server: &MockServer, route: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(html_page(title, links))
        .mount(server)
        .await;
}

async fn mount_robots(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn crawl(config: &Config) -> ripple_collector::output::CrawlStatistics {
    run_crawl(
        config.clone(),
        "test",
        ResumeMode::Auto,
        CancellationToken::new(),
    )
    .await
    .expect("Crawl failed")
}

fn open_store(config: &Config) -> SqliteStore {
    SqliteStore::open_existing(Path::new(&config.store.path)).expect("Failed to open store")
}

fn state_of(store: &SqliteStore, url: &str) -> Option<CrawlState> {
    store.get(url).unwrap().map(|reference| reference.state)
}

#[tokio::test]
async fn test_full_crawl_single_site() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", "Home", &["/page1", "/page2"]).await;
    mount_page(&server, "/page1", "Page 1", &["/", "/page2"]).await;
    mount_page(&server, "/page2", "Page 2", &["/missing"]).await;

    let config = create_test_config(&dir, vec![format!("{}/", base)]);
    let stats = crawl(&config).await;

    assert_eq!(stats.start_urls, Some(1));
    assert_eq!(stats.count(CrawlState::New), 3);
    assert_eq!(stats.count(CrawlState::NotFound), 1);
    assert_eq!(stats.queued, 0);

    let store = open_store(&config);
    let page2 = store.get(&format!("{}/page2", base)).unwrap().unwrap();
    assert_eq!(page2.depth, 1);
    assert_eq!(page2.referrer_reference, Some(format!("{}/", base)));
    assert_eq!(
        state_of(&store, &format!("{}/missing", base)),
        Some(CrawlState::NotFound)
    );

    let committer = SqliteCommitter::open(Path::new(&config.committer.path)).unwrap();
    assert_eq!(committer.count().unwrap(), 3);
    let home = committer.get(&format!("{}/", base)).unwrap().unwrap();
    assert_eq!(home.metadata["title"], vec!["Home"]);
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nDisallow: /private").await;
    mount_page(&server, "/", "Home", &["/private/secret", "/public"]).await;
    mount_page(&server, "/public", "Public", &[]).await;
    Mock::given(method("GET"))
        .and(path("/private/secret"))
        .respond_with(html_page("Secret", &[]))
        .expect(0)
        .mount(&server)
        .await;

    let config = create_test_config(&dir, vec![format!("{}/", base)]);
    crawl(&config).await;

    let store = open_store(&config);
    assert_eq!(state_of(&store, &format!("{}/public", base)), Some(CrawlState::New));
    assert_eq!(state_of(&store, &format!("{}/private/secret", base)), None);
}

#[tokio::test]
async fn test_crawl_with_depth_limit() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", "Home", &["/level1"]).await;
    mount_page(&server, "/level1", "Level 1", &["/level2"]).await;
    mount_page(&server, "/level2", "Level 2", &["/level3"]).await;

    let mut config = create_test_config(&dir, vec![format!("{}/", base)]);
    config.crawler.max_depth = Some(1);
    let stats = crawl(&config).await;

    assert_eq!(stats.processed, 2);
    let store = open_store(&config);
    assert!(store.is_processed(&format!("{}/level1", base)).unwrap());
    assert!(!store.is_processed(&format!("{}/level2", base)).unwrap());
}

#[tokio::test]
async fn test_sitemap_start_urls() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(
                    r#"<?xml version="1.0" encoding="UTF-8"?>
                    <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
                      <url><loc>{base}/a</loc><changefreq>daily</changefreq><priority>0.8</priority></url>
                      <url><loc>{base}/b</loc></url>
                    </urlset>"#,
                    base = base
                ))
                .insert_header("content-type", "application/xml"),
        )
        .mount(&server)
        .await;
    mount_page(&server, "/a", "A", &[]).await;
    mount_page(&server, "/b", "B", &[]).await;

    let mut config = create_test_config(&dir, vec![]);
    config.start.sitemaps = vec![format!("{}/sitemap.xml", base)];
    let stats = crawl(&config).await;

    assert_eq!(stats.start_urls, Some(2));
    let store = open_store(&config);
    let a = store.get(&format!("{}/a", base)).unwrap().unwrap();
    assert_eq!(a.state, CrawlState::New);
    assert_eq!(a.sitemap_change_freq.as_deref(), Some("daily"));
    assert_eq!(a.sitemap_priority, Some(0.8));
    assert_eq!(state_of(&store, &format!("{}/b", base)), Some(CrawlState::New));
}

#[tokio::test]
async fn test_second_run_detects_unmodified_and_deleted() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", "Home", &["/kept", "/removed"]).await;
    mount_page(&server, "/kept", "Kept", &[]).await;
    mount_page(&server, "/removed", "Removed", &[]).await;

    let config = create_test_config(&dir, vec![format!("{}/", base)]);
    crawl(&config).await;

    let committer_path = Path::new(&config.committer.path).to_path_buf();
    assert_eq!(SqliteCommitter::open(&committer_path).unwrap().count().unwrap(), 3);

    // Second run: /removed is gone, everything else is unchanged
    server.reset().await;
    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", "Home", &["/kept", "/removed"]).await;
    mount_page(&server, "/kept", "Kept", &[]).await;

    let stats = crawl(&config).await;
    assert_eq!(stats.count(CrawlState::Unmodified), 2);
    assert_eq!(stats.count(CrawlState::NotFound), 1);

    let committer = SqliteCommitter::open(&committer_path).unwrap();
    assert_eq!(committer.count().unwrap(), 2);
    assert!(committer.get(&format!("{}/removed", base)).unwrap().is_none());
}

#[tokio::test]
async fn test_clean_run_forgets_previous_documents() {
    let server = MockServer::start().await;
    let base = server.uri();
    let dir = TempDir::new().unwrap();

    mount_robots(&server, "User-agent: *\nAllow: /").await;
    mount_page(&server, "/", "Home", &[]).await;

    let config = create_test_config(&dir, vec![format!("{}/", base)]);
    crawl(&config).await;

    let stats = run_crawl(
        config.clone(),
        "test",
        ResumeMode::Clean,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(stats.count(CrawlState::New), 1);
    assert_eq!(stats.count(CrawlState::Unmodified), 0);
}
