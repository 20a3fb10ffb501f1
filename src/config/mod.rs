//! Configuration module for the collector
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use ripple_collector::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("collector.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.num_threads);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CommitterConfig, Config, CrawlerConfig, DomainEntry, FetchConfig, NormalizerConfig,
    OrphansStrategy, StartConfig, StoreConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::validate;
