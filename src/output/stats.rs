//! Statistics generation from the crawl store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::state::CrawlState;
use crate::storage::{CrawlStore, StorageResult};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Start URLs identified by seeding, None when the run was resumed
    pub start_urls: Option<usize>,

    /// Total number of references processed in the current run
    pub processed: u64,

    /// Count of processed references by final state
    pub by_state: HashMap<CrawlState, u64>,

    /// References still waiting in the queue
    pub queued: u64,

    /// References handed to a worker and not finished
    pub active: u64,
}

impl CrawlStatistics {
    pub fn with_start_urls(mut self, start_urls: Option<usize>) -> Self {
        self.start_urls = start_urls;
        self
    }

    /// Count for a single state
    pub fn count(&self, state: CrawlState) -> u64 {
        self.by_state.get(&state).copied().unwrap_or(0)
    }

    /// References committed or confirmed unchanged
    pub fn good(&self) -> u64 {
        self.by_state
            .iter()
            .filter(|(state, _)| state.is_good())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The crawl store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn CrawlStore) -> StorageResult<CrawlStatistics> {
    let mut by_state = store.count_by_state()?;
    by_state.retain(|_, count| *count > 0);

    Ok(CrawlStatistics {
        start_urls: None,
        processed: store.processed_count()?,
        by_state,
        queued: store.queue_size()?,
        active: store.active_count()?,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    match stats.start_urls {
        Some(count) => println!("  Start URLs identified: {}", count),
        None => println!("  Start URLs identified: (resumed run)"),
    }
    println!("  References processed: {}", stats.processed);
    println!("  References queued: {}", stats.queued);
    if stats.active > 0 {
        println!("  References in progress: {}", stats.active);
    }
    println!();

    println!("References by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));

    for (state, count) in state_counts {
        let percentage = if stats.processed > 0 {
            (*count as f64 / stats.processed as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    let failures = stats.count(CrawlState::BadStatus) + stats.count(CrawlState::Error);
    if failures > 0 {
        println!("Failures (retried on the next run): {}", failures);
        println!();
    }

    let success_rate = if stats.processed > 0 {
        (stats.good() as f64 / stats.processed as f64) * 100.0
    } else {
        0.0
    };
    println!("Success rate: {:.1}%", success_rate);
}
