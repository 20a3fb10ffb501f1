//! Storage traits and error types
//!
//! This module defines the trait interface for crawl store backends and
//! associated error types.

use crate::state::{CachedReference, CrawlReference, CrawlState};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for crawl store implementations
///
/// The store is the only state shared by all crawl workers. Implementations
/// must make `queued`, `next_queued` and `processed` linearizable with respect
/// to each other: no reference is handed out twice by `next_queued`, and no
/// reference is ever both pending and processed.
pub trait CrawlStore: Send + Sync {
    // ===== Queue Management =====

    /// Queues a reference unless it is already known to the current run
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The reference was queued
    /// * `Ok(false)` - The reference was already queued, active or processed
    fn queued(&self, reference: &CrawlReference) -> StorageResult<bool>;

    /// Pops the oldest queued reference and marks it active
    fn next_queued(&self) -> StorageResult<Option<CrawlReference>>;

    /// Records a reference as processed with its final state
    ///
    /// The reference leaves the queue, the active set and the cache.
    fn processed(&self, reference: &CrawlReference) -> StorageResult<()>;

    // ===== Lookups =====

    fn is_queued(&self, reference: &str) -> StorageResult<bool>;

    fn is_active(&self, reference: &str) -> StorageResult<bool>;

    fn is_processed(&self, reference: &str) -> StorageResult<bool>;

    /// Gets a reference known to the current run
    fn get(&self, reference: &str) -> StorageResult<Option<CrawlReference>>;

    /// Gets a reference as left by the previous run
    fn get_cached(&self, reference: &str) -> StorageResult<Option<CachedReference>>;

    /// Returns all cached references not yet processed in this run
    fn cached_references(&self) -> StorageResult<Vec<CachedReference>>;

    /// Whether this store was opened to resume an interrupted run
    fn is_resuming(&self) -> bool;

    // ===== Statistics =====

    fn queue_size(&self) -> StorageResult<u64>;

    fn active_count(&self) -> StorageResult<u64>;

    fn processed_count(&self) -> StorageResult<u64>;

    /// Counts processed references by final state
    fn count_by_state(&self) -> StorageResult<HashMap<CrawlState, u64>>;

    // ===== Maintenance =====

    /// Marks the current run as completed so the next open starts fresh
    fn complete_run(&self) -> StorageResult<()>;

    /// Deletes every reference, including the cache
    fn reset(&self) -> StorageResult<()>;
}
