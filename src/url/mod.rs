//! URL handling module for Ripple-Collector
//!
//! This module provides URL normalization, URL roots, host patterns,
//! and the domain exclusion filter used by the queue pipeline.

mod domain;
mod matcher;
mod normalize;

use crate::config::DomainEntry;
use url::Url;

pub use domain::{extract_domain, root_of, url_root};
pub use matcher::HostPattern;
pub use normalize::UrlNormalizer;

/// Rejects URLs whose host matches one of the configured exclusion patterns
#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    patterns: Vec<HostPattern>,
}

impl ExclusionFilter {
    pub fn new(entries: &[DomainEntry]) -> Self {
        Self {
            patterns: entries
                .iter()
                .map(|e| HostPattern::parse(&e.domain))
                .collect(),
        }
    }

    /// Returns true if the URL's host is excluded
    pub fn is_excluded(&self, url: &Url) -> bool {
        let Some(domain) = extract_domain(url) else {
            return false;
        };
        self.patterns.iter().any(|pattern| pattern.covers(&domain))
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
