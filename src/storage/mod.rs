//! Storage module for persisting crawl data
//!
//! This module handles the crawl reference store, including:
//! - SQLite database initialization and schema management
//! - The FIFO queue of references waiting to be processed
//! - Deduplication across the current run
//! - The cache of references processed by the previous run
//! - Run tracking and resumption support

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{CrawlStore, StorageError, StorageResult};

/// Where a reference stands in the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting in the queue
    Queued,
    /// Handed to a worker
    Active,
    /// Done for this run
    Processed,
}

impl Stage {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Processed => "processed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "active" => Some(Self::Active),
            "processed" => Some(Self::Processed),
            _ => None,
        }
    }
}

/// How a store should treat state left by a previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// Resume if the previous run was interrupted with work left
    Auto,
    /// Always start a new run
    Fresh,
    /// Start a new run without any memory of previous runs
    Clean,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}
