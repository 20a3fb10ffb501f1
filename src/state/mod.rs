//! State module for tracking crawl progress
//!
//! This module provides the per-reference state carried through the crawl pipeline.
//!
//! # Components
//!
//! - `CrawlState`: Lifecycle state of a reference (queued, new, modified, rejected, etc.)
//! - `CrawlReference`: A reference (URL) plus everything known about how it was discovered
//!   and what happened when it was last processed

mod crawl_reference;
mod crawl_state;

// Re-export main types
pub use crawl_reference::{CachedReference, CrawlReference};
pub use crawl_state::CrawlState;
