//! Streaming sitemap parser
//!
//! Reads `<urlset>` and `<sitemapindex>` documents one entry at a time so
//! large sitemaps are handed over while they are being read.

use crate::state::CrawlReference;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use url::Url;

/// One entry read from a sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapItem {
    /// A page listed by a `<urlset>`
    Url(CrawlReference),
    /// A child sitemap listed by a `<sitemapindex>`
    Sitemap(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Url,
    Sitemap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
}

#[derive(Debug, Default)]
struct PartialEntry {
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
}

/// Pull parser over a sitemap document
pub struct SitemapParser<'a> {
    reader: Reader<&'a [u8]>,
    buf: Vec<u8>,
    location: String,
}

impl<'a> SitemapParser<'a> {
    /// Creates a parser over a sitemap body
    ///
    /// `location` is only used in log messages.
    pub fn new(body: &'a [u8], location: impl Into<String>) -> Self {
        Self {
            reader: Reader::from_reader(body),
            buf: Vec::with_capacity(4096),
            location: location.into(),
        }
    }

    /// Reads up to the next complete entry
    ///
    /// Entries without a valid absolute `loc` are skipped.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(SitemapItem))` - The next entry
    /// * `Ok(None)` - End of document
    /// * `Err(quick_xml::Error)` - Malformed XML; entries read so far remain valid
    pub fn next_item(&mut self) -> Result<Option<SitemapItem>, quick_xml::Error> {
        let mut entry: Option<(EntryKind, PartialEntry)> = None;
        let mut field: Option<Field> = None;
        let mut text = String::new();

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"url" => entry = Some((EntryKind::Url, PartialEntry::default())),
                    b"sitemap" => entry = Some((EntryKind::Sitemap, PartialEntry::default())),
                    name if entry.is_some() => {
                        field = field_for(name);
                        text.clear();
                    }
                    _ => {}
                },
                Event::Text(ref e) => {
                    if field.is_some() {
                        if let Ok(unescaped) = e.unescape() {
                            text.push_str(&unescaped);
                        }
                    }
                }
                Event::CData(ref e) => {
                    if field.is_some() {
                        text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"url" | b"sitemap" => {
                        if let Some((kind, partial)) = entry.take() {
                            if let Some(item) = to_item(kind, partial, &self.location) {
                                return Ok(Some(item));
                            }
                        }
                    }
                    _ => {
                        if let (Some(f), Some((_, partial))) = (field.take(), entry.as_mut()) {
                            let value = text.trim().to_string();
                            match f {
                                Field::Loc => partial.loc = Some(value),
                                Field::LastMod => partial.lastmod = Some(value),
                                Field::ChangeFreq => partial.changefreq = Some(value),
                                Field::Priority => partial.priority = Some(value),
                            }
                        }
                    }
                },
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

}

fn to_item(kind: EntryKind, partial: PartialEntry, location: &str) -> Option<SitemapItem> {
    let loc = partial.loc.filter(|l| !l.is_empty())?;
    let url = match Url::parse(&loc) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
        _ => {
            tracing::debug!("Skipping invalid sitemap loc '{}' in {}", loc, location);
            return None;
        }
    };

    match kind {
        EntryKind::Sitemap => Some(SitemapItem::Sitemap(url.to_string())),
        EntryKind::Url => {
            let mut reference = CrawlReference::new(url.to_string(), 0);
            reference.sitemap_last_mod = partial.lastmod.as_deref().and_then(parse_lastmod);
            reference.sitemap_change_freq = partial.changefreq.filter(|c| !c.is_empty());
            reference.sitemap_priority = partial
                .priority
                .and_then(|p| p.parse::<f32>().ok())
                .filter(|p| (0.0..=1.0).contains(p));
            Some(SitemapItem::Url(reference))
        }
    }
}

fn field_for(name: &[u8]) -> Option<Field> {
    match name {
        b"loc" => Some(Field::Loc),
        b"lastmod" => Some(Field::LastMod),
        b"changefreq" => Some(Field::ChangeFreq),
        b"priority" => Some(Field::Priority),
        _ => None,
    }
}

/// Parses a W3C datetime as used by `<lastmod>`
fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
