//! Ripple-Collector main entry point
//!
//! This is the command-line interface for the Ripple-Collector web crawler.

use anyhow::Context;
use clap::Parser;
use ripple_collector::config::{load_config_with_hash, Config};
use ripple_collector::crawler::{read_seed_file, run_crawl};
use ripple_collector::output::{load_statistics, print_statistics};
use ripple_collector::storage::{ResumeMode, SqliteStore};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Ripple-Collector: A resumable, polite web crawler
///
/// Ripple-Collector crawls websites from start URLs and sitemaps while
/// respecting robots.txt and politeness delays. Fetched documents are
/// imported and committed; an interrupted crawl resumes where it stopped.
#[derive(Parser, Debug)]
#[command(name = "ripple-collector")]
#[command(version)]
#[command(about = "A resumable, polite web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a new run even if the previous one was interrupted
    #[arg(long, conflicts_with = "clean")]
    fresh: bool,

    /// Forget all previous runs, including what was learned about documents
    #[arg(long, conflicts_with = "fresh")]
    clean: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the crawl store and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

impl Cli {
    fn resume_mode(&self) -> ResumeMode {
        if self.clean {
            ResumeMode::Clean
        } else if self.fresh {
            ResumeMode::Fresh
        } else {
            ResumeMode::Auto
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, &config_hash, cli.resume_mode()).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_collector=info,warn"),
            1 => EnvFilter::new("ripple_collector=debug,info"),
            2 => EnvFilter::new("ripple_collector=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the configuration and the start sources
fn handle_dry_run(config: &Config) {
    println!("=== Ripple-Collector Dry Run ===\n");

    let crawler = &config.crawler;
    println!("Crawler Configuration:");
    println!("  Worker tasks: {}", crawler.num_threads);
    match crawler.max_depth {
        Some(depth) => println!("  Max depth: {}", depth),
        None => println!("  Max depth: unlimited"),
    }
    println!("  Minimum delay per host: {}ms", crawler.min_delay_ms);
    println!("  Orphans strategy: {:?}", crawler.orphans_strategy);
    println!("  Robots.txt: {}", support(crawler.ignore_robots_txt));
    println!("  Robots meta: {}", support(crawler.ignore_robots_meta));
    println!("  Sitemaps: {}", support(crawler.ignore_sitemap));
    println!("  Canonical links: {}", support(crawler.ignore_canonical_links));

    println!("\nFetching:");
    println!("  Timeout: {}ms", config.fetch.timeout_ms);
    println!(
        "  Retries: {} ({}ms apart)",
        config.fetch.max_retries, config.fetch.retry_delay_ms
    );
    println!("  User-Agent: {}", config.user_agent.header_value());

    println!("\nStorage:");
    println!("  Crawl store: {}", config.store.path);
    println!("  Committer: {}", config.committer.path);

    println!("\nStart Sitemaps ({}):", config.start.sitemaps.len());
    for sitemap in &config.start.sitemaps {
        println!("  - {}", sitemap);
    }

    println!("\nStart URLs ({}):", config.start.urls.len());
    for url in &config.start.urls {
        println!("  - {}", url);
    }

    let mut file_urls = 0;
    println!("\nStart URL Files ({}):", config.start.url_files.len());
    for path in &config.start.url_files {
        match read_seed_file(path) {
            Ok(urls) => {
                println!("  - {} ({} URLs)", path.display(), urls.len());
                file_urls += urls.len();
            }
            Err(e) => println!("  - {} (unreadable: {})", path.display(), e),
        }
    }

    println!("\nExcluded Domains ({}):", config.exclude.len());
    for entry in &config.exclude {
        println!("  - {}", entry.domain);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start crawling with {} start URLs and {} sitemaps",
        config.start.urls.len() + file_urls,
        config.start.sitemaps.len()
    );
}

fn support(ignored: bool) -> &'static str {
    if ignored {
        "ignored"
    } else {
        "enabled"
    }
}

/// Handles the --stats mode: shows statistics from the crawl store
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let path = Path::new(&config.store.path);
    println!("Crawl store: {}\n", path.display());

    if !path.exists() {
        anyhow::bail!("No crawl store at {}", path.display());
    }

    let store = SqliteStore::open_existing(path)
        .with_context(|| format!("Failed to open crawl store {}", path.display()))?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, config_hash: &str, mode: ResumeMode) -> anyhow::Result<()> {
    match mode {
        ResumeMode::Auto => {
            tracing::info!("Starting crawl (will resume if interrupted run exists)")
        }
        ResumeMode::Fresh => tracing::info!("Starting fresh crawl (ignoring previous state)"),
        ResumeMode::Clean => tracing::info!("Starting clean crawl (forgetting previous runs)"),
    }

    // Stop between two references on Ctrl-C; the run stays resumable
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing references in progress");
            on_signal.cancel();
        }
    });

    // Run the crawler
    match run_crawl(config, config_hash, mode, cancel).await {
        Ok(stats) => {
            println!();
            print_statistics(&stats);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
