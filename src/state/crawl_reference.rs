//! Crawl reference: a URL and everything recorded about it during a crawl

use crate::state::CrawlState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A reference (URL) tracked by the crawler
///
/// One of these exists per distinct normalized URL seen in the current crawl.
/// The `reference` field is the key in the crawl store and never changes once
/// persisted; a canonicalized or redirected URL is represented by a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlReference {
    /// Normalized URL
    pub reference: String,

    /// URL as it was before normalization, if normalization changed it
    #[serde(default)]
    pub original_reference: Option<String>,

    /// Normalized reference this raw-URL record stands in for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_of: Option<String>,

    /// Hops from the nearest seed (seeds are 0)
    pub depth: u32,

    /// URL of the document this reference was discovered in
    #[serde(default)]
    pub referrer_reference: Option<String>,

    /// Tag of the referring link (e.g. `a.href`)
    #[serde(default)]
    pub referrer_link_tag: Option<String>,

    /// Text of the referring link
    #[serde(default)]
    pub referrer_link_text: Option<String>,

    /// Title attribute of the referring link
    #[serde(default)]
    pub referrer_link_title: Option<String>,

    /// URLs traversed through HTTP redirects before reaching this one
    #[serde(default)]
    pub redirect_trail: Vec<String>,

    #[serde(default)]
    pub sitemap_change_freq: Option<String>,

    #[serde(default)]
    pub sitemap_last_mod: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sitemap_priority: Option<f32>,

    /// Links extracted from this document (empty until import succeeds)
    #[serde(default)]
    pub referenced_urls: BTreeSet<String>,

    /// SHA-256 of the fetched content
    #[serde(default)]
    pub content_checksum: Option<String>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub status_code: Option<u16>,

    /// When the reference was last fetched
    #[serde(default)]
    pub crawl_date: Option<DateTime<Utc>>,

    pub state: CrawlState,
}

/// A reference as it was left by a previous crawl run
pub type CachedReference = CrawlReference;

impl CrawlReference {
    /// Creates a new queued reference at the given depth
    pub fn new(reference: impl Into<String>, depth: u32) -> Self {
        Self {
            reference: reference.into(),
            original_reference: None,
            variation_of: None,
            depth,
            referrer_reference: None,
            referrer_link_tag: None,
            referrer_link_text: None,
            referrer_link_title: None,
            redirect_trail: Vec::new(),
            sitemap_change_freq: None,
            sitemap_last_mod: None,
            sitemap_priority: None,
            referenced_urls: BTreeSet::new(),
            content_checksum: None,
            content_type: None,
            status_code: None,
            crawl_date: None,
            state: CrawlState::Queued,
        }
    }

    /// Sets the referring document
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer_reference = Some(referrer.into());
        self
    }

    /// Returns true if any of the referrer link tag, text or title is known
    pub fn has_referrer_link_context(&self) -> bool {
        self.referrer_link_tag.is_some()
            || self.referrer_link_text.is_some()
            || self.referrer_link_title.is_some()
    }

    /// Copies missing referrer link data from a cached counterpart
    ///
    /// Only applies when both share the same (non-null) referrer, since link
    /// context from a different referring page would be wrong.
    pub fn backfill_referrer_from(&mut self, cached: &CachedReference) {
        if self.referrer_reference.is_none()
            || self.referrer_reference != cached.referrer_reference
        {
            return;
        }
        if self.referrer_link_tag.is_none() {
            self.referrer_link_tag = cached.referrer_link_tag.clone();
        }
        if self.referrer_link_text.is_none() {
            self.referrer_link_text = cached.referrer_link_text.clone();
        }
        if self.referrer_link_title.is_none() {
            self.referrer_link_title = cached.referrer_link_title.clone();
        }
    }

    /// Returns the variation keyed by the pre-normalization URL, if there is one
    ///
    /// The variation only records that the raw URL was handled. It owns no
    /// document and no links, so it never becomes an orphan in a later run.
    pub fn original_variation(&self) -> Option<CrawlReference> {
        let original = self.original_reference.as_deref()?;
        if original.trim().is_empty() || original == self.reference {
            return None;
        }
        let mut variation = self.clone();
        variation.reference = original.to_string();
        variation.original_reference = None;
        variation.variation_of = Some(self.reference.clone());
        variation.referenced_urls.clear();
        variation.content_checksum = None;
        Some(variation)
    }

    /// Returns true for a record standing in for a normalized reference
    pub fn is_variation(&self) -> bool {
        self.variation_of.is_some()
    }
}
