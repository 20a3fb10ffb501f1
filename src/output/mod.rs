//! Output module for crawl summaries
//!
//! Statistics are read back from the crawl store, printed at the end of a run
//! and by `--stats`.

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlStatistics};
